use futures::future::join_all;
use std::sync::Arc;

use xena_socket::{wait_for_states, Channel};
use xena_transport::Transport;
use xena_wire::{Address, Command};

use crate::{
    port::Reservation,
    tree::{Index, Kind, NodeId},
    Error, Session,
};

/// Module type of modules without CFP cages. Their port count is fixed.
const NOT_CFP: &str = "NOTCFP";

impl<T: Transport> Session<T> {
    /// Discovers the modules and ports of every connected chassis.
    pub async fn inventory(&mut self) -> Result<(), Error> {
        for chassis in self.tree.children(self.tree.root(), Kind::Chassis) {
            self.chassis_inventory(chassis).await?;
        }
        Ok(())
    }

    /// Discovers the modules of `chassis` and their ports, and reads the default
    /// attributes of each.
    ///
    /// Nodes that are still present keep their ids and cached attributes. Running it
    /// twice yields the same tree.
    pub async fn chassis_inventory(&mut self, chassis: NodeId) -> Result<Vec<NodeId>, Error> {
        self.expect_kind(chassis, Kind::Chassis)?;

        let info = self.get_attributes(chassis, &[]).await?;
        let counts = match info.get("c_portcounts") {
            Some(counts) => counts.clone(),
            None => self.get_attribute(chassis, "c_portcounts").await?,
        };

        let present = parse_numbers(&counts, "c_portcounts")?
            .into_iter()
            .enumerate()
            .filter(|(_, count)| *count > 0)
            .map(|(module, _)| module as u32)
            .collect::<Vec<_>>();

        let modules = self.sync_children(chassis, Kind::Module, &present)?;
        for &module in &modules {
            self.module_inventory(module).await?;
        }

        tracing::debug!(chassis = ?chassis, modules = modules.len(), "Inventory done");
        Ok(modules)
    }

    /// Discovers the ports of `module` and reads their default attributes.
    pub async fn module_inventory(&mut self, module: NodeId) -> Result<Vec<NodeId>, Error> {
        self.expect_kind(module, Kind::Module)?;

        let info = self.get_attributes(module, &[]).await?;
        let cfp_type = match info.get("m_cfptype") {
            Some(cfp_type) => cfp_type.clone(),
            None => self.get_attribute(module, "m_cfptype").await?,
        };

        // CFP modules report the active port count as the first field of the cage config.
        let count = if cfp_type.contains(NOT_CFP) {
            parse_number(&self.get_attribute(module, "m_portcount").await?, "m_portcount")?
        } else {
            let config = self.get_attribute(module, "m_cfpconfig").await?;
            let first = config.split_whitespace().next().unwrap_or_default();
            parse_number(first, "m_cfpconfig")?
        };

        let indices = (0..count).collect::<Vec<_>>();
        let ports = self.sync_children(module, Kind::Port, &indices)?;
        for &port in &ports {
            self.get_attributes(port, &[]).await?;
        }

        Ok(ports)
    }

    pub fn modules(&self, chassis: NodeId) -> Vec<NodeId> {
        self.tree.children(chassis, Kind::Module)
    }

    /// Makes the children of `parent` with the given kind match `indices`: missing ones
    /// are attached, stale ones detached, existing ones kept untouched. Returns the
    /// nodes in the order of `indices`.
    pub(crate) fn sync_children(
        &mut self,
        parent: NodeId,
        kind: Kind,
        indices: &[u32],
    ) -> Result<Vec<NodeId>, Error> {
        let parent_index = self.tree.node(parent)?.index().clone();

        for existing in self.tree.children(parent, kind) {
            let stale = self
                .tree
                .get(existing)
                .and_then(|n| n.index().last())
                .map_or(true, |last| !indices.contains(&last));

            if stale {
                self.tree.remove(existing);
            }
        }

        let mut nodes = Vec::with_capacity(indices.len());
        for &i in indices {
            let index = parent_index.child(i);
            let id = match self.tree.child(parent, kind, &index) {
                Some(id) => id,
                None => {
                    let name = self.default_name(parent, kind, &index);
                    self.tree.insert(parent, kind, index, name)?
                }
            };
            nodes.push(id);
        }

        Ok(nodes)
    }

    /// Ports are named `chassis/module/port`, everything else by its own index.
    pub(crate) fn default_name(&self, parent: NodeId, kind: Kind, index: &Index) -> String {
        let chassis = self.tree.ancestor(parent, Kind::Chassis).and_then(|c| self.tree.get(c));

        match (kind, chassis) {
            (Kind::Port, Some(chassis)) => format!("{}/{index}", chassis.name()),
            _ => index.last().map(|i| i.to_string()).unwrap_or_default(),
        }
    }

    /// Returns the port node for `module/port` on `chassis`, attaching it and its
    /// module if the inventory hasn't discovered them.
    pub(crate) fn ensure_port(
        &mut self,
        chassis: NodeId,
        module: u32,
        port: u32,
    ) -> Result<NodeId, Error> {
        let module_index = Index::root().child(module);
        let module = match self.tree.child(chassis, Kind::Module, &module_index) {
            Some(id) => id,
            None => {
                let name = module_index.to_string();
                self.tree.insert(chassis, Kind::Module, module_index.clone(), name)?
            }
        };

        let port_index = module_index.child(port);
        match self.tree.child(module, Kind::Port, &port_index) {
            Some(id) => Ok(id),
            None => {
                let name = self.default_name(module, Kind::Port, &port_index);
                self.tree.insert(module, Kind::Port, port_index, name)
            }
        }
    }

    /// Starts traffic on `ports` and waits until every one of them reports it.
    ///
    /// With no ports given, all ports reserved by this session are started. Ports are
    /// started with one command per chassis, so that ports of one chassis start in the
    /// same instant; the chassis are driven concurrently.
    pub async fn start_traffic(&mut self, ports: &[NodeId]) -> Result<(), Error> {
        self.set_traffic(ports, true).await
    }

    /// Stops traffic on `ports`, see [`Self::start_traffic`].
    pub async fn stop_traffic(&mut self, ports: &[NodeId]) -> Result<(), Error> {
        self.set_traffic(ports, false).await
    }

    async fn set_traffic(&mut self, ports: &[NodeId], on: bool) -> Result<(), Error> {
        let state = if on { "on" } else { "off" };
        let ports = if ports.is_empty() { self.reserved_ports() } else { ports.to_vec() };

        let mut groups: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        for port in ports {
            self.expect_kind(port, Kind::Port)?;
            let chassis = self.tree.ancestor(port, Kind::Chassis).ok_or(Error::Detached)?;

            match groups.iter_mut().find(|(c, _)| *c == chassis) {
                Some((_, group)) => group.push(port),
                None => groups.push((chassis, vec![port])),
            }
        }

        let timeout = self.options.traffic_timeout;
        let interval = self.options.poll_interval;

        let mut jobs = Vec::with_capacity(groups.len());
        for (chassis, ports) in groups {
            let conn = Arc::clone(self.connection(chassis)?);

            let mut locations = Vec::with_capacity(ports.len() * 2);
            let mut channels = Vec::with_capacity(ports.len());
            for port in ports {
                let index = self.tree.node(port)?.index();
                locations.extend(index.components().iter().map(u32::to_string));
                channels.push((port, Channel::new(Arc::clone(&conn), index.address())));
            }

            let command = Command::new(Address::chassis(), "c_traffic").arg(state).args(locations);
            jobs.push(async move {
                conn.execute(command).await?;

                let waits = channels.into_iter().map(|(port, mut channel)| async move {
                    let result = wait_for_states(
                        &mut channel,
                        "p_traffic",
                        timeout,
                        interval,
                        &[state],
                    )
                    .await;
                    (port, result)
                });

                Ok::<_, xena_socket::Error>(join_all(waits).await)
            });
        }

        let mut first_error = None;
        for outcome in join_all(jobs).await {
            let results = match outcome {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!("Traffic command failed: {}", e);
                    first_error = first_error.or(Some(Error::from(e)));
                    continue;
                }
            };

            for (port, result) in results {
                match result {
                    Ok(value) => self.tree.cache(port, "p_traffic", &value),
                    Err(e) => {
                        if let xena_socket::Error::StateTimeout { last: Some(last), .. } = &e {
                            self.tree.cache(port, "p_traffic", last);
                        }
                        tracing::warn!(port = ?port, "Port didn't reach traffic {}: {}", state, e);
                        first_error = first_error.or(Some(Error::from(e)));
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Ports whose cached reservation says they belong to this session.
    pub(crate) fn reserved_ports(&self) -> Vec<NodeId> {
        self.tree
            .get_objects_by_type(self.tree.root(), Kind::Port)
            .into_iter()
            .filter(|port| {
                self.tree
                    .get(*port)
                    .and_then(|n| n.cached("p_reservation"))
                    .is_some_and(|value| value == Reservation::ReservedByYou.as_str())
            })
            .collect()
    }
}

pub(crate) fn parse_number(value: &str, attribute: &str) -> Result<u32, Error> {
    value.trim().parse().map_err(|_| Error::UnexpectedValue {
        attribute: attribute.to_string(),
        value: value.to_string(),
    })
}

/// Parses a whitespace separated list of numbers.
pub(crate) fn parse_numbers(value: &str, attribute: &str) -> Result<Vec<u32>, Error> {
    value.split_whitespace().map(|v| parse_number(v, attribute)).collect()
}
