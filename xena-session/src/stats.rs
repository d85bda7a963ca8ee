//! Counter reads for ports, streams, payload tags and captures.
//!
//! Counters change with every packet, so they are read from the chassis on every call
//! and never cached on the node.

use rustc_hash::FxHashMap;

use xena_transport::Transport;

use crate::{
    session::check_text,
    tree::{Kind, NodeId},
    Error, Session,
};

/// Counters of one statistics query, in the order the chassis reports them. Latency
/// and jitter report a negative value while no packet has been measured.
pub type Counters = Vec<i64>;

impl<T: Transport> Session<T> {
    /// Reads a single counter query of `node`, e.g. `pt_total` of a port or
    /// `pr_tpldlatency` of a payload tag.
    pub async fn read_stat(&self, node: NodeId, token: &str) -> Result<Counters, Error> {
        check_text("statistics token", token)?;

        let value = self.channel(node)?.get_attribute(token).await?;
        parse_counters(&value, token)
    }

    /// Reads every counter group of `node` with one bulk query, keyed by token.
    ///
    /// See [`Kind::stats_tokens`] for the groups of each kind.
    pub async fn read_stats(&self, node: NodeId) -> Result<FxHashMap<String, Counters>, Error> {
        let kind = self.tree.node(node)?.kind();
        let tokens = kind.stats_tokens();
        if tokens.is_empty() {
            return Err(Error::InvalidInput(format!("{kind} has no statistics")));
        }

        let values = self.channel(node)?.get_attributes(tokens).await?;
        values
            .into_iter()
            .map(|(token, value)| {
                let counters = parse_counters(&value, &token)?;
                Ok((token, counters))
            })
            .collect()
    }

    /// Transmit and receive counters of `port`.
    pub async fn read_port_stats(
        &self,
        port: NodeId,
    ) -> Result<FxHashMap<String, Counters>, Error> {
        self.expect_kind(port, Kind::Port)?;
        self.read_stats(port).await
    }

    /// Transmit counters of every stream of `port`, in stream order.
    pub async fn read_stream_stats(
        &mut self,
        port: NodeId,
    ) -> Result<Vec<(NodeId, Counters)>, Error> {
        let streams = self.streams(port).await?;

        let mut stats = Vec::with_capacity(streams.len());
        for stream in streams {
            stats.push((stream, self.read_stat(stream, "pt_stream").await?));
        }

        Ok(stats)
    }

    /// Receive counters of every payload tag the port currently sees.
    pub async fn read_tpld_stats(
        &mut self,
        port: NodeId,
    ) -> Result<Vec<(NodeId, FxHashMap<String, Counters>)>, Error> {
        let tplds = self.tplds(port).await?;

        let mut stats = Vec::with_capacity(tplds.len());
        for tpld in tplds {
            stats.push((tpld, self.read_stats(tpld).await?));
        }

        Ok(stats)
    }
}

/// Parses a whitespace separated list of signed counters.
pub(crate) fn parse_counters(value: &str, attribute: &str) -> Result<Counters, Error> {
    value
        .split_whitespace()
        .map(|v| {
            v.parse().map_err(|_| Error::UnexpectedValue {
                attribute: attribute.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}
