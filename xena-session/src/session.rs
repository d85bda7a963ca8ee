use rustc_hash::FxHashMap;
use std::{sync::Arc, time::Duration};

use xena_socket::{wait_for_states, Channel, Connection, KeepAlive};
use xena_transport::{Tcp, Transport};
use xena_wire::{is_printable, quote, Address};

use crate::{
    tree::{Index, Kind, NodeId, ResourceNode, Tree},
    Error, SessionOptions, TpldAllocator,
};

/// Connection state of one chassis: its connection and the heartbeat running on it.
#[derive(Debug)]
pub(crate) struct ChassisLink {
    pub(crate) conn: Arc<Connection>,
    keepalive: KeepAlive,
    pub(crate) owner: String,
}

impl ChassisLink {
    /// Stops the heartbeat, then closes the connection.
    async fn shutdown(self) {
        self.keepalive.stop().await;
        self.conn.close().await;
    }
}

/// A client session: the root of the resource tree.
#[derive(Debug)]
pub struct Session<T: Transport = Tcp> {
    transport: T,
    pub(crate) options: SessionOptions,
    pub(crate) tree: Tree,
    pub(crate) links: FxHashMap<NodeId, ChassisLink>,
    pub(crate) tplds: TpldAllocator,
}

impl Default for Session<Tcp> {
    fn default() -> Self {
        Self::new(Tcp::default())
    }
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, SessionOptions::default())
    }

    pub fn with_options(transport: T, options: SessionOptions) -> Self {
        Self {
            transport,
            options,
            tree: Tree::new(),
            links: FxHashMap::default(),
            tplds: TpldAllocator::new(),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn node(&self, id: NodeId) -> Result<&ResourceNode, Error> {
        self.tree.node(id)
    }

    /// The payload tag allocator shared by all streams of this session.
    pub fn tpld_allocator(&self) -> &TpldAllocator {
        &self.tplds
    }

    /// The connection of the chassis owning `node`.
    pub fn connection(&self, node: NodeId) -> Result<&Arc<Connection>, Error> {
        let chassis = self.tree.ancestor(node, Kind::Chassis).ok_or_else(|| {
            Error::InvalidInput("the session node has no command target".to_string())
        })?;

        self.links.get(&chassis).map(|link| &link.conn).ok_or(Error::Detached)
    }

    /// The owner tag the chassis of `node` was logged on with.
    pub fn owner(&self, node: NodeId) -> Option<&str> {
        let chassis = self.tree.ancestor(node, Kind::Chassis)?;
        self.links.get(&chassis).map(|link| link.owner.as_str())
    }

    /// A command channel scoped to the address of `node`.
    pub fn channel(&self, node: NodeId) -> Result<Channel, Error> {
        self.channel_at(node, self.tree.node(node)?.index())
    }

    /// A command channel for `index` on the chassis owning `node`, for resources that
    /// aren't attached to the tree yet.
    pub(crate) fn channel_at(&self, node: NodeId, index: &Index) -> Result<Channel, Error> {
        Ok(Channel::new(Arc::clone(self.connection(node)?), index.address()))
    }

    pub(crate) fn expect_kind(&self, node: NodeId, kind: Kind) -> Result<&ResourceNode, Error> {
        let found = self.tree.node(node)?;
        if found.kind() != kind {
            return Err(Error::InvalidInput(format!(
                "expected a {kind}, got {} {}",
                found.kind(),
                found.index()
            )));
        }
        Ok(found)
    }

    /// Connects to a chassis, logs on and starts its keep-alive task.
    ///
    /// `address` is a host, optionally with `:port`. The chassis is attached to the tree
    /// only if every step succeeds; on failure the heartbeat is stopped and the
    /// connection closed again.
    pub async fn add_chassis(
        &mut self,
        address: &str,
        owner: &str,
        password: &str,
    ) -> Result<NodeId, Error> {
        let address = address.trim();
        if address.is_empty() || address.contains('/') || address.contains(' ') {
            return Err(Error::InvalidInput(format!("invalid chassis address {address:?}")));
        }
        if owner.trim().is_empty() {
            return Err(Error::InvalidInput("owner must not be empty".to_string()));
        }
        check_text("chassis address", address)?;
        check_text("owner", owner)?;
        check_text("password", password)?;
        if self.chassis_by_name(address).is_some() {
            return Err(Error::Duplicate {
                kind: Kind::Chassis,
                index: Index::root(),
                name: address.to_string(),
            });
        }

        let target = match address.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
                address.to_string()
            }
            _ => format!("{address}:{}", self.options.port),
        };

        let conn = Connection::connect(&self.transport, &target, self.options.conn.clone()).await?;
        let conn = Arc::new(conn);
        let link = ChassisLink {
            keepalive: KeepAlive::spawn(Arc::clone(&conn)),
            conn,
            owner: owner.to_string(),
        };

        let attached = match Self::logon(&link.conn, owner, password).await {
            Ok(()) => self.tree.insert(self.tree.root(), Kind::Chassis, Index::root(), address),
            Err(e) => Err(e),
        };

        match attached {
            Ok(id) => {
                tracing::info!(chassis = address, owner, "Chassis connected");
                self.links.insert(id, link);
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(chassis = address, "Failed to attach chassis: {}", e);
                link.shutdown().await;
                Err(e)
            }
        }
    }

    /// Releases every port reserved by this session, then disconnects all chassis.
    ///
    /// Teardown always completes; the first release error, if any, is returned after
    /// every chassis has been disconnected. Calling this on an empty session is a no-op.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        let released = self.release_ports().await;
        if let Err(e) = &released {
            tracing::warn!("Failed to release ports: {}", e);
        }

        for chassis in self.tree.children(self.tree.root(), Kind::Chassis) {
            if let Some(link) = self.links.remove(&chassis) {
                link.shutdown().await;
            }

            let name = self.tree.get(chassis).map(|n| n.name().to_string()).unwrap_or_default();
            self.tree.remove(chassis);
            tracing::info!(chassis = %name, "Chassis disconnected");
        }

        released
    }

    /// All chassis, keyed by address.
    pub fn chassis_list(&self) -> Vec<(String, NodeId)> {
        self.named(self.tree.children(self.tree.root(), Kind::Chassis))
    }

    pub fn chassis_by_name(&self, name: &str) -> Option<NodeId> {
        self.tree
            .children(self.tree.root(), Kind::Chassis)
            .into_iter()
            .find(|c| self.tree.get(*c).is_some_and(|n| n.name() == name))
    }

    /// All ports known to the session, keyed by `chassis/module/port`.
    pub fn ports(&self) -> Vec<(String, NodeId)> {
        self.named(self.tree.get_objects_by_type(self.tree.root(), Kind::Port))
    }

    /// Looks up a port by its `chassis/module/port` name.
    pub fn port(&self, name: &str) -> Result<Option<NodeId>, Error> {
        let found = self.tree.get_object_by_name(self.tree.root(), name)?;
        Ok(found.filter(|id| self.tree.get(*id).is_some_and(|n| n.kind() == Kind::Port)))
    }

    fn named(&self, ids: Vec<NodeId>) -> Vec<(String, NodeId)> {
        ids.into_iter()
            .filter_map(|id| self.tree.get(id).map(|n| (n.name().to_string(), id)))
            .collect()
    }

    /// Sends a command to `node` and waits for the acknowledgement.
    pub async fn send_command(
        &self,
        node: NodeId,
        token: &str,
        args: &[&str],
    ) -> Result<(), Error> {
        check_text("command token", token)?;
        for arg in args {
            check_text("command argument", arg)?;
        }

        Ok(self.channel(node)?.send_command(token, args.iter().copied()).await?)
    }

    /// Queries `name` on `node` and updates the attribute cache.
    pub async fn get_attribute(&mut self, node: NodeId, name: &str) -> Result<String, Error> {
        let value = self.channel(node)?.get_attribute(name).await?;
        self.tree.cache(node, name, &value);
        Ok(value)
    }

    /// Bulk query on `node`. With no tokens, the default info queries of the node's kind
    /// are used. Every returned value is cached.
    pub async fn get_attributes(
        &mut self,
        node: NodeId,
        tokens: &[&str],
    ) -> Result<FxHashMap<String, String>, Error> {
        let tokens =
            if tokens.is_empty() { self.tree.node(node)?.kind().info_tokens() } else { tokens };
        if tokens.is_empty() {
            return Ok(FxHashMap::default());
        }

        let values = self.channel(node)?.get_attributes(tokens).await?;
        for (name, value) in &values {
            self.tree.cache(node, name, value);
        }

        Ok(values)
    }

    /// Sets attributes one command at a time, in order.
    ///
    /// Every name and value is checked before the first command is sent. The first
    /// attribute the chassis rejects stops the sequence and its error is returned.
    /// Attributes set before it stay applied on the chassis and in the cache; the
    /// chassis has no way to roll them back.
    pub async fn set_attributes<I, K, V>(
        &mut self,
        node: NodeId,
        attributes: I,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let attributes = attributes.into_iter().collect::<Vec<_>>();
        for (name, value) in &attributes {
            check_text("attribute name", name.as_ref())?;
            check_text("attribute value", value.as_ref())?;
        }

        let channel = self.channel(node)?;

        for (name, value) in &attributes {
            let (name, value) = (name.as_ref(), value.as_ref());
            channel.set_attribute(name, value).await?;
            self.tree.cache(node, &name.to_ascii_lowercase(), unquote(value));
        }

        Ok(())
    }

    /// Polls `attribute` on `node` until it reports one of `accepted`.
    ///
    /// The last observed value is cached whether or not the wait succeeds.
    pub async fn wait_for_states(
        &mut self,
        node: NodeId,
        attribute: &str,
        timeout: Duration,
        accepted: &[&str],
    ) -> Result<String, Error> {
        let mut channel = self.channel(node)?;
        let result =
            wait_for_states(&mut channel, attribute, timeout, self.options.poll_interval, accepted)
                .await;

        match &result {
            Ok(value) => self.tree.cache(node, attribute, value),
            Err(xena_socket::Error::StateTimeout { last: Some(last), .. }) => {
                self.tree.cache(node, attribute, last);
            }
            Err(_) => {}
        }

        Ok(result?)
    }

    async fn logon(conn: &Arc<Connection>, owner: &str, password: &str) -> Result<(), Error> {
        let chassis = Channel::new(Arc::clone(conn), Address::chassis());
        chassis.send_command("c_logon", [quote(password)]).await?;
        chassis.send_command("c_owner", [quote(owner)]).await?;

        tracing::debug!(peer = conn.peer(), owner, "Logged on");
        Ok(())
    }
}

/// Rejects text the chassis can't take: anything but printable ASCII. A line break
/// would split the command in two and shift every later reply.
pub(crate) fn check_text(what: &str, value: &str) -> Result<(), Error> {
    if is_printable(value) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{what} {value:?} must be printable ASCII")))
    }
}

/// Strips one pair of enclosing double quotes.
pub(crate) fn unquote(value: &str) -> &str {
    value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value)
}
