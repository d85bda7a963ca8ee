use std::{fmt, time::Duration};

use xena_transport::Transport;
use xena_wire::quote;

use crate::{
    chassis::{parse_number, parse_numbers},
    tree::{CachePolicy, Kind, NodeId},
    session::check_text,
    Error, Session,
};

/// Reservation state of a port, as reported by `p_reservation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Released,
    ReservedByYou,
    ReservedByOther,
}

impl Reservation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Released => "RELEASED",
            Self::ReservedByYou => "RESERVED_BY_YOU",
            Self::ReservedByOther => "RESERVED_BY_OTHER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::Released, Self::ReservedByYou, Self::ReservedByOther]
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transmit state of a stream, `ps_enable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Enabled,
    Disabled,
    /// Configured, but not transmitting. Keeps the stream's rate share.
    Suppressed,
}

impl StreamState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "ON",
            Self::Disabled => "OFF",
            Self::Suppressed => "SUPPRESS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::Enabled, Self::Disabled, Self::Suppressed]
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

/// Splits `chassis/module/port`.
fn parse_location(location: &str) -> Result<(&str, u32, u32), Error> {
    let invalid = || Error::InvalidInput(format!("invalid port location {location:?}"));

    let mut parts = location.trim().rsplitn(3, '/');
    let (Some(port), Some(module), Some(host)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if host.is_empty() {
        return Err(invalid());
    }

    let module = module.parse().map_err(|_| invalid())?;
    let port = port.parse().map_err(|_| invalid())?;
    Ok((host, module, port))
}

impl<T: Transport> Session<T> {
    /// Reserves and resets the ports at `locations` (`chassis/module/port`).
    ///
    /// All locations are validated before anything is sent. Ports reserved by someone
    /// else are only taken over with `force`; otherwise the first such port fails the
    /// call with [`Error::ReservationConflict`], leaving earlier ports reserved.
    pub async fn reserve_ports(
        &mut self,
        locations: &[&str],
        force: bool,
    ) -> Result<Vec<NodeId>, Error> {
        let mut targets = Vec::with_capacity(locations.len());
        for location in locations {
            let (host, module, port) = parse_location(location)?;
            let chassis = self
                .chassis_by_name(host)
                .ok_or_else(|| Error::InvalidInput(format!("chassis {host} is not connected")))?;
            targets.push((chassis, module, port));
        }

        let mut ports = Vec::with_capacity(targets.len());
        for (chassis, module, port) in targets {
            let port = self.ensure_port(chassis, module, port)?;
            self.reserve_port(port, force).await?;
            self.reset_port(port).await?;
            ports.push(port);
        }

        Ok(ports)
    }

    /// Releases every port reserved by this session.
    ///
    /// Ports known to be released or owned by someone else are skipped. All ports are
    /// attempted; the first error is returned.
    pub async fn release_ports(&mut self) -> Result<(), Error> {
        let mut first_error = None;

        for port in self.tree.get_objects_by_type(self.tree.root(), Kind::Port) {
            let cached = self
                .tree
                .get(port)
                .and_then(|n| n.cached("p_reservation"))
                .and_then(Reservation::parse);
            if matches!(cached, Some(Reservation::Released | Reservation::ReservedByOther)) {
                continue;
            }

            if let Err(e) = self.release_port(port).await {
                tracing::warn!(port = ?port, "Failed to release port: {}", e);
                first_error = first_error.or(Some(e));
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub async fn reservation(&mut self, port: NodeId) -> Result<Reservation, Error> {
        self.expect_kind(port, Kind::Port)?;

        let value = self.get_attribute(port, "p_reservation").await?;
        Reservation::parse(&value).ok_or(Error::UnexpectedValue {
            attribute: "p_reservation".to_string(),
            value,
        })
    }

    /// Owner tag of the session holding `port`. Empty if released.
    pub async fn reserved_by(&mut self, port: NodeId) -> Result<String, Error> {
        self.expect_kind(port, Kind::Port)?;
        self.get_attribute(port, "p_reservedby").await
    }

    /// Reserves `port` for this session. Already owning it is a no-op.
    pub async fn reserve_port(&mut self, port: NodeId, force: bool) -> Result<(), Error> {
        match self.reservation(port).await? {
            Reservation::ReservedByYou => return Ok(()),
            Reservation::ReservedByOther if !force => {
                let owner = self.reserved_by(port).await?;
                let port = self.tree.node(port)?.name().to_string();
                return Err(Error::ReservationConflict { port, owner });
            }
            Reservation::ReservedByOther => self.relinquish_port(port).await?,
            Reservation::Released => {}
        }

        self.send_command(port, "p_reservation", &["reserve"]).await?;
        self.tree.cache(port, "p_reservation", Reservation::ReservedByYou.as_str());

        tracing::info!(port = self.tree.node(port)?.name(), "Port reserved");
        Ok(())
    }

    /// Forces the release of a port reserved by another session and waits until the
    /// chassis reports it released.
    pub async fn relinquish_port(&mut self, port: NodeId) -> Result<(), Error> {
        self.expect_kind(port, Kind::Port)?;

        self.send_command(port, "p_reservation", &["relinquish"]).await?;
        let timeout = self.options.release_timeout;
        let released = [Reservation::Released.as_str()];
        self.wait_for_states(port, "p_reservation", timeout, &released).await?;

        Ok(())
    }

    /// Releases `port` if this session holds it.
    pub async fn release_port(&mut self, port: NodeId) -> Result<(), Error> {
        if self.reservation(port).await? != Reservation::ReservedByYou {
            return Ok(());
        }

        self.send_command(port, "p_reservation", &["release"]).await?;
        self.tree.cache(port, "p_reservation", Reservation::Released.as_str());
        self.tree.cache(port, "p_reservedby", "");

        tracing::info!(port = self.tree.node(port)?.name(), "Port released");
        Ok(())
    }

    /// Resets `port` to its defaults. Every resource below it is detached first, since
    /// the chassis deletes them.
    pub async fn reset_port(&mut self, port: NodeId) -> Result<(), Error> {
        self.expect_kind(port, Kind::Port)?;

        let dropped = self.tree.clear_children(port);
        tracing::debug!(port = ?port, dropped, "Resetting port");

        self.send_command(port, "p_reset", &[]).await
    }

    /// Waits for the port's receiver to report sync.
    pub async fn wait_for_up(&mut self, port: NodeId, timeout: Duration) -> Result<(), Error> {
        self.expect_kind(port, Kind::Port)?;
        self.wait_for_states(port, "p_receivesync", timeout, &["IN_SYNC"]).await?;
        Ok(())
    }

    /// Clears the transmit and receive statistics of `port`.
    pub async fn clear_stats(&mut self, port: NodeId) -> Result<(), Error> {
        self.expect_kind(port, Kind::Port)?;
        self.send_command(port, "pt_clear", &[]).await?;
        self.send_command(port, "pr_clear", &[]).await
    }

    pub async fn streams(&mut self, port: NodeId) -> Result<Vec<NodeId>, Error> {
        self.sub_resources(port, Kind::Stream).await
    }

    pub async fn filters(&mut self, port: NodeId) -> Result<Vec<NodeId>, Error> {
        self.sub_resources(port, Kind::Filter).await
    }

    pub async fn matches(&mut self, port: NodeId) -> Result<Vec<NodeId>, Error> {
        self.sub_resources(port, Kind::Match).await
    }

    pub async fn lengths(&mut self, port: NodeId) -> Result<Vec<NodeId>, Error> {
        self.sub_resources(port, Kind::Length).await
    }

    /// Payload tags currently seen by the port's receiver. Always re-read.
    pub async fn tplds(&mut self, port: NodeId) -> Result<Vec<NodeId>, Error> {
        self.sub_resources(port, Kind::Tpld).await
    }

    /// Children of `port` with the given kind.
    ///
    /// Persistent kinds are enumerated from the chassis only while the port has none
    /// attached, and get their labels from the comment attribute. Discovered streams
    /// move the payload tag allocator past their tags.
    async fn sub_resources(&mut self, port: NodeId, kind: Kind) -> Result<Vec<NodeId>, Error> {
        self.expect_kind(port, Kind::Port)?;
        let token = kind
            .indices_token()
            .ok_or_else(|| Error::InvalidInput(format!("{kind} isn't a port sub-resource")))?;

        let persistent = kind.cache_policy() == CachePolicy::Persistent;
        let attached = self.tree.children(port, kind);
        if persistent && !attached.is_empty() {
            return Ok(attached);
        }

        let indices = parse_numbers(&self.get_attribute(port, token).await?, token)?;
        let nodes = self.sync_children(port, kind, &indices)?;
        if !persistent {
            return Ok(nodes);
        }

        if let Some(comment) = kind.comment_token() {
            for &node in &nodes {
                let label = self.get_attribute(node, comment).await?;
                if !label.is_empty() {
                    self.tree.rename(node, label)?;
                }
            }
        }

        if kind == Kind::Stream {
            let mut ids = Vec::with_capacity(nodes.len());
            for &node in &nodes {
                let id = self.get_attribute(node, "ps_tpldid").await?;
                ids.push(parse_number(&id, "ps_tpldid")?);
            }
            self.tplds.observe(ids);
        }

        Ok(nodes)
    }

    /// Creates a sub-resource on the chassis at the next free index and attaches it.
    async fn create_sub_resource(
        &mut self,
        port: NodeId,
        kind: Kind,
        name: Option<&str>,
    ) -> Result<NodeId, Error> {
        if let Some(name) = name {
            check_text("name", name)?;
        }

        let create = kind
            .create_token()
            .ok_or_else(|| Error::InvalidInput(format!("{kind} can't be created")))?;

        let existing = self.sub_resources(port, kind).await?;
        let index = self.tree.node(port)?.index().child(existing.len() as u32);
        let name = match name {
            Some(name) => name.to_string(),
            None => self.default_name(port, kind, &index),
        };

        if self.tree.child(port, kind, &index).is_some() {
            return Err(Error::Duplicate { kind, index, name });
        }

        let channel = self.channel_at(port, &index)?;
        channel.send_command(create, Vec::<String>::new()).await?;
        self.tree.insert(port, kind, index, name)
    }

    /// Creates a stream on `port`.
    ///
    /// The stream gets `tpld_id` as its payload tag, or the next free one. Its label
    /// defaults to its index. Nothing is created once the automatic tags are used up.
    pub async fn add_stream(
        &mut self,
        port: NodeId,
        name: Option<&str>,
        tpld_id: Option<u32>,
        state: StreamState,
    ) -> Result<NodeId, Error> {
        let exhausted = || Error::InvalidInput("no payload tag ids left".to_string());
        if tpld_id.is_none() && self.tplds.peek().is_none() {
            return Err(exhausted());
        }

        let stream = self.create_sub_resource(port, Kind::Stream, name).await?;
        let tpld_id = self.tplds.assign(tpld_id).ok_or_else(exhausted)?;

        let label = quote(self.tree.node(stream)?.name());
        let attributes = [("ps_comment", label), ("ps_tpldid", tpld_id.to_string())];
        self.set_attributes(stream, attributes).await?;
        self.set_stream_state(stream, state).await?;

        tracing::debug!(stream = ?stream, tpld_id, "Stream created");
        Ok(stream)
    }

    pub async fn set_stream_state(
        &mut self,
        stream: NodeId,
        state: StreamState,
    ) -> Result<(), Error> {
        self.expect_kind(stream, Kind::Stream)?;
        self.set_attributes(stream, [("ps_enable", state.as_str())]).await
    }

    /// Payload tag of `stream` as last read or written.
    pub fn stream_tpld_id(&self, stream: NodeId) -> Option<u32> {
        self.tree.get(stream)?.cached("ps_tpldid")?.trim().parse().ok()
    }

    pub async fn add_filter(
        &mut self,
        port: NodeId,
        comment: Option<&str>,
    ) -> Result<NodeId, Error> {
        let filter = self.create_sub_resource(port, Kind::Filter, comment).await?;

        let label = quote(self.tree.node(filter)?.name());
        self.set_attributes(filter, [("pf_comment", label)]).await?;

        Ok(filter)
    }

    pub async fn add_match(&mut self, port: NodeId) -> Result<NodeId, Error> {
        self.create_sub_resource(port, Kind::Match, None).await
    }

    pub async fn add_length(&mut self, port: NodeId) -> Result<NodeId, Error> {
        self.create_sub_resource(port, Kind::Length, None).await
    }

    /// Deletes a stream, filter, match or length term on the chassis and detaches it.
    pub async fn remove(&mut self, node: NodeId) -> Result<(), Error> {
        let kind = self.tree.node(node)?.kind();
        let delete = kind
            .delete_token()
            .ok_or_else(|| Error::InvalidInput(format!("{kind} can't be deleted")))?;

        self.send_command(node, delete, &[]).await?;
        self.tree.remove(node);

        Ok(())
    }

    /// The capture of `port`. It shares the port's address.
    pub fn capture(&mut self, port: NodeId) -> Result<NodeId, Error> {
        let index = self.expect_kind(port, Kind::Port)?.index().clone();

        match self.tree.children(port, Kind::Capture).first() {
            Some(capture) => Ok(*capture),
            None => self.tree.insert(port, Kind::Capture, index, Kind::Capture.name()),
        }
    }

    /// Starts capturing on `port`. Packets of an earlier capture are discarded.
    pub async fn start_capture(&mut self, port: NodeId) -> Result<NodeId, Error> {
        self.expect_kind(port, Kind::Port)?;

        self.tree.del_objects_by_type(port, Kind::Capture);
        self.send_command(port, "p_capture", &["on"]).await?;

        self.capture(port)
    }

    pub async fn stop_capture(&mut self, port: NodeId) -> Result<(), Error> {
        self.expect_kind(port, Kind::Port)?;
        self.send_command(port, "p_capture", &["off"]).await
    }

    /// Number of packets captured so far. Read from the chassis on every call.
    pub async fn capture_packet_count(&mut self, capture: NodeId) -> Result<u32, Error> {
        self.expect_kind(capture, Kind::Capture)?;

        // status, packets, start time
        let stats = self.get_attribute(capture, "pc_stats").await?;
        let packets = stats.split_whitespace().nth(1).unwrap_or_default();
        parse_number(packets, "pc_stats")
    }

    /// The captured packets, re-enumerated on every call.
    pub async fn capture_packets(&mut self, capture: NodeId) -> Result<Vec<NodeId>, Error> {
        let count = self.capture_packet_count(capture).await?;
        let indices = (0..count).collect::<Vec<_>>();
        self.sync_children(capture, Kind::CapturePacket, &indices)
    }

    /// Raw bytes of a captured packet as a hex string.
    pub async fn packet_hex(&mut self, packet: NodeId) -> Result<String, Error> {
        self.expect_kind(packet, Kind::CapturePacket)?;

        let value = self.get_attribute(packet, "pc_packet").await?;
        let hex = value.trim();
        let hex = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")).unwrap_or(hex);

        Ok(hex.to_string())
    }
}
