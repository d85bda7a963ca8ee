//! A scripted chassis speaking the text protocol over a local TCP listener.

use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

pub const PASSWORD: &str = "xena";

/// Highest payload tag the chassis accepts.
pub const MAX_TPLD: u32 = 1023;

#[derive(Debug)]
pub struct FakeStream {
    pub comment: String,
    pub tpld_id: u32,
    pub enable: String,
}

#[derive(Debug, Default)]
pub struct FakePort {
    pub reserved_by: String,
    pub traffic_on_at: Option<Instant>,
    pub streams: BTreeMap<u32, FakeStream>,
    pub filters: BTreeMap<u32, String>,
    pub matches: BTreeSet<u32>,
    pub lengths: BTreeSet<u32>,
    pub tplds: Vec<u32>,
    pub packets: Vec<String>,
    pub capturing: bool,
    pub resets: usize,
    /// Counter values keyed by `token` or `token [index]`. Missing counters read as zero.
    pub stats: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct ChassisState {
    /// Port count per module slot.
    pub modules: Vec<u32>,
    pub ports: BTreeMap<(u32, u32), FakePort>,
    /// How long ports take to report traffic after `c_traffic on`.
    pub traffic_delay: Duration,
    /// Every command received, heartbeats and `sync` excluded.
    pub commands: Vec<String>,
    pub last_command_at: Option<Instant>,
    /// When the last client connection was closed.
    pub closed_at: Option<Instant>,
}

impl ChassisState {
    fn new(modules: &[u32]) -> Self {
        let mut ports = BTreeMap::new();
        for (m, count) in modules.iter().enumerate() {
            for p in 0..*count {
                ports.insert((m as u32, p), FakePort::default());
            }
        }

        Self {
            modules: modules.to_vec(),
            ports,
            traffic_delay: Duration::ZERO,
            commands: Vec::new(),
            last_command_at: None,
            closed_at: None,
        }
    }

    pub fn port(&mut self, m: u32, p: u32) -> &mut FakePort {
        self.ports.get_mut(&(m, p)).expect("no such port")
    }
}

/// Per-connection state.
#[derive(Default)]
struct Peer {
    owner: String,
    logged_on: bool,
}

pub struct FakeChassis {
    pub addr: String,
    pub state: Arc<Mutex<ChassisState>>,
}

impl FakeChassis {
    pub async fn spawn(modules: &[u32]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(ChassisState::new(modules)));

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, Arc::clone(&shared)));
            }
        });

        Self { addr, state }
    }

    /// `chassis/module/port` location of a port on this chassis.
    pub fn location(&self, m: u32, p: u32) -> String {
        format!("{}/{m}/{p}", self.addr)
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Waits until the client has closed its connection.
    pub async fn closed_at(&self) -> Instant {
        for _ in 0..100 {
            if let Some(at) = self.state.lock().closed_at {
                return at;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("connection to {} was never closed", self.addr);
    }
}

async fn serve(socket: TcpStream, state: Arc<Mutex<ChassisState>>) {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut peer = Peer::default();

    while let Ok(Some(line)) = lines.next_line().await {
        let replies = state.lock().handle(&mut peer, line.trim());

        let mut out = String::new();
        for reply in replies {
            out.push_str(&reply);
            out.push_str("\r\n");
        }

        if write.write_all(out.as_bytes()).await.is_err() {
            break;
        }
    }

    state.lock().closed_at = Some(Instant::now());
}

struct Parsed<'a> {
    module: Option<u32>,
    port: Option<u32>,
    token: String,
    sub: Option<u32>,
    args: &'a str,
}

impl<'a> Parsed<'a> {
    fn parse(line: &'a str) -> Self {
        let (first, rest) = split_word(line);
        let (module, port, token, mut rest) = if first.starts_with(|c: char| c.is_ascii_digit()) {
            let mut numbers = first.split('/').map(|n| n.parse().ok());
            let module = numbers.next().flatten();
            let port = numbers.next().flatten();
            let (token, rest) = split_word(rest);
            (module, port, token, rest)
        } else {
            (None, None, first, rest)
        };

        let mut sub = None;
        if let Some(bracketed) = rest.strip_prefix('[') {
            if let Some((inner, tail)) = bracketed.split_once(']') {
                sub = inner.trim().parse().ok();
                rest = tail.trim_start();
            }
        }

        Self { module, port, token: token.to_ascii_lowercase(), sub, args: rest.trim() }
    }

    fn is_query(&self) -> bool {
        self.args == "?"
    }

    fn echo(&self, value: impl std::fmt::Display) -> String {
        let address = match (self.module, self.port) {
            (Some(m), Some(p)) => format!("{m}/{p} "),
            (Some(m), None) => format!("{m} "),
            _ => String::new(),
        };
        let sub = self.sub.map(|s| format!(" [{s}]")).unwrap_or_default();

        format!("{address}{}{sub}  {value}", self.token.to_ascii_uppercase())
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').to_string()
}

fn ok() -> Vec<String> {
    vec!["<OK>".to_string()]
}

fn error(reason: &str) -> Vec<String> {
    vec![format!("<{reason}>")]
}

fn syntax_error() -> Vec<String> {
    vec!["#Syntax error in command".to_string()]
}

impl ChassisState {
    fn handle(&mut self, peer: &mut Peer, line: &str) -> Vec<String> {
        if line.is_empty() {
            return Vec::new();
        }
        if line.eq_ignore_ascii_case("sync") {
            return vec!["<SYNC>".to_string()];
        }

        let cmd = Parsed::parse(line);
        if cmd.token == "c_keepalive" {
            return vec![cmd.echo(0)];
        }
        self.commands.push(line.to_string());
        self.last_command_at = Some(Instant::now());

        if !peer.logged_on && cmd.token != "c_logon" {
            return error("NOTLOGGEDON");
        }

        match (cmd.module, cmd.port) {
            (None, _) => self.chassis_command(peer, &cmd),
            (Some(m), None) => self.module_command(m, &cmd),
            (Some(m), Some(p)) => self.port_command(peer, m, p, &cmd),
        }
    }

    fn chassis_command(&mut self, peer: &mut Peer, cmd: &Parsed<'_>) -> Vec<String> {
        let counts = self.modules.iter().map(u32::to_string).collect::<Vec<_>>().join(" ");

        match (cmd.token.as_str(), cmd.is_query()) {
            ("c_logon", false) if unquote(cmd.args) == PASSWORD => {
                peer.logged_on = true;
                ok()
            }
            ("c_logon", false) => error("BADPASSWORD"),
            ("c_owner", false) => {
                peer.owner = unquote(cmd.args);
                ok()
            }
            ("c_info", true) => vec![
                "C_MODEL  \"XenaCompact\"".to_string(),
                format!("C_PORTCOUNTS  {counts}"),
                "C_SERIALNO  1234".to_string(),
            ],
            ("c_portcounts", true) => vec![cmd.echo(counts)],
            ("c_traffic", false) => {
                let mut words = cmd.args.split_whitespace();
                let on = match words.next() {
                    Some(state) if state.eq_ignore_ascii_case("on") => true,
                    Some(state) if state.eq_ignore_ascii_case("off") => false,
                    _ => return error("BADVALUE"),
                };

                let numbers = words.map(str::parse).collect::<Result<Vec<u32>, _>>();
                let Ok(numbers) = numbers else {
                    return error("BADVALUE");
                };
                if numbers.len() % 2 != 0 {
                    return error("BADVALUE");
                }

                let delay = self.traffic_delay;
                for pair in numbers.chunks(2) {
                    let Some(port) = self.ports.get_mut(&(pair[0], pair[1])) else {
                        return error("BADINDEX");
                    };
                    if port.reserved_by != peer.owner {
                        return error("NOTRESERVED");
                    }
                    port.traffic_on_at = on.then(|| Instant::now() + delay);
                }
                ok()
            }
            _ => syntax_error(),
        }
    }

    fn module_command(&mut self, m: u32, cmd: &Parsed<'_>) -> Vec<String> {
        let Some(count) = self.modules.get(m as usize).copied().filter(|c| *c > 0) else {
            return error("NOTVALID");
        };

        match (cmd.token.as_str(), cmd.is_query()) {
            ("m_info", true) => vec![
                format!("{m}  M_CFPTYPE  NOTCFP"),
                format!("{m}  M_PORTCOUNT  {count}"),
                format!("{m}  M_MODEL  \"Odin-1G-3S-6P\""),
            ],
            ("m_cfptype", true) => vec![cmd.echo("NOTCFP")],
            ("m_portcount", true) => vec![cmd.echo(count)],
            _ => syntax_error(),
        }
    }

    fn port_command(&mut self, peer: &Peer, m: u32, p: u32, cmd: &Parsed<'_>) -> Vec<String> {
        let Some(port) = self.ports.get_mut(&(m, p)) else {
            return error("BADINDEX");
        };

        let token = cmd.token.as_str();
        if token == "p_reservation" {
            return port.reservation_command(peer, cmd);
        }
        if !cmd.is_query() && port.reserved_by != peer.owner {
            return error("NOTRESERVED");
        }

        let query = cmd.is_query();
        let sub = cmd.sub;

        match (token, query, sub) {
            ("p_reservedby", true, None) => vec![cmd.echo(format!("\"{}\"", port.reserved_by))],
            ("p_info", true, None) => vec![
                format!("{m}/{p}  P_RESERVATION  {}", port.reservation(peer)),
                format!("{m}/{p}  P_RESERVEDBY  \"{}\"", port.reserved_by),
                format!("{m}/{p}  P_SPEED  1000"),
            ],
            ("p_config", true, None) => vec![format!("{m}/{p}  P_COMMENT  \"\"")],
            ("p_receivesync", true, None) => vec![cmd.echo("IN_SYNC")],
            ("p_traffic", true, None) => {
                let on = port.traffic_on_at.is_some_and(|at| Instant::now() >= at);
                vec![cmd.echo(if on { "ON" } else { "OFF" })]
            }
            ("p_reset", false, None) => {
                port.streams.clear();
                port.filters.clear();
                port.matches.clear();
                port.lengths.clear();
                port.traffic_on_at = None;
                port.resets += 1;
                ok()
            }
            ("pt_clear" | "pr_clear", false, None) => {
                let prefix = &token[..3];
                port.stats.retain(|key, _| !key.starts_with(prefix));
                ok()
            }
            ("p_capture", false, None) => {
                port.capturing = cmd.args.eq_ignore_ascii_case("on");
                if port.capturing {
                    port.packets = vec![
                        "0x00112233445566778899AABB".to_string(),
                        "0x0A0B0C0D".to_string(),
                        "0xFFFF".to_string(),
                    ];
                }
                ok()
            }
            ("pc_stats", true, None) => vec![cmd.echo(format!("0 {} 0", port.packets.len()))],
            ("pc_packet", true, Some(i)) => match port.packets.get(i as usize) {
                Some(packet) => vec![cmd.echo(packet)],
                None => error("BADINDEX"),
            },
            ("pr_tplds", true, None) => vec![cmd.echo(join(port.tplds.iter()))],
            ("ps_indices", true, None) => vec![cmd.echo(join(port.streams.keys()))],
            ("pf_indices", true, None) => vec![cmd.echo(join(port.filters.keys()))],
            ("pm_indices", true, None) => vec![cmd.echo(join(port.matches.iter()))],
            ("pl_indices", true, None) => vec![cmd.echo(join(port.lengths.iter()))],
            ("ps_create", false, Some(i)) => {
                if port.streams.contains_key(&i) {
                    return error("BADINDEX");
                }
                let stream =
                    FakeStream { comment: String::new(), tpld_id: i, enable: "ON".to_string() };
                port.streams.insert(i, stream);
                ok()
            }
            ("pf_create", false, Some(i)) => {
                insert_unique(port.filters.insert(i, String::new()).is_none())
            }
            ("pm_create", false, Some(i)) => insert_unique(port.matches.insert(i)),
            ("pl_create", false, Some(i)) => insert_unique(port.lengths.insert(i)),
            ("ps_delete", false, Some(i)) => removed(port.streams.remove(&i).is_some()),
            ("pf_delete", false, Some(i)) => removed(port.filters.remove(&i).is_some()),
            ("pm_delete", false, Some(i)) => removed(port.matches.remove(&i)),
            ("pl_delete", false, Some(i)) => removed(port.lengths.remove(&i)),
            ("pf_comment", _, Some(i)) => match port.filters.get_mut(&i) {
                Some(comment) if query => vec![cmd.echo(format!("\"{comment}\""))],
                Some(comment) => {
                    *comment = unquote(cmd.args);
                    ok()
                }
                None => error("BADINDEX"),
            },
            ("ps_comment" | "ps_tpldid" | "ps_enable" | "ps_config", _, Some(i)) => {
                let Some(stream) = port.streams.get_mut(&i) else {
                    return error("BADINDEX");
                };
                stream.command(cmd, m, p, i)
            }
            (counter, true, _) if counter.starts_with("pt_") || counter.starts_with("pr_") => {
                let key = match sub {
                    Some(i) => format!("{counter} [{i}]"),
                    None => counter.to_string(),
                };
                let value = port.stats.get(&key).map_or("0 0 0 0", String::as_str);
                vec![cmd.echo(value)]
            }
            _ => syntax_error(),
        }
    }
}

impl FakePort {
    fn reservation(&self, peer: &Peer) -> &'static str {
        if self.reserved_by.is_empty() {
            "RELEASED"
        } else if self.reserved_by == peer.owner {
            "RESERVED_BY_YOU"
        } else {
            "RESERVED_BY_OTHER"
        }
    }

    fn reservation_command(&mut self, peer: &Peer, cmd: &Parsed<'_>) -> Vec<String> {
        match cmd.args.to_ascii_lowercase().as_str() {
            "?" => vec![cmd.echo(self.reservation(peer))],
            "reserve" if self.reserved_by.is_empty() || self.reserved_by == peer.owner => {
                self.reserved_by = peer.owner.clone();
                ok()
            }
            "reserve" => error("NOTVALID"),
            "release" if self.reserved_by == peer.owner => {
                self.reserved_by.clear();
                ok()
            }
            "release" => error("NOTRESERVED"),
            "relinquish" if !self.reserved_by.is_empty() && self.reserved_by != peer.owner => {
                self.reserved_by.clear();
                ok()
            }
            "relinquish" => error("NOTVALID"),
            _ => error("BADVALUE"),
        }
    }
}

impl FakeStream {
    fn command(&mut self, cmd: &Parsed<'_>, m: u32, p: u32, i: u32) -> Vec<String> {
        let query = cmd.is_query();

        match cmd.token.as_str() {
            "ps_config" if query => vec![
                format!("{m}/{p}  PS_COMMENT  [{i}]  \"{}\"", self.comment),
                format!("{m}/{p}  PS_TPLDID  [{i}]  {}", self.tpld_id),
                format!("{m}/{p}  PS_ENABLE  [{i}]  {}", self.enable),
            ],
            "ps_comment" if query => vec![cmd.echo(format!("\"{}\"", self.comment))],
            "ps_tpldid" if query => vec![cmd.echo(self.tpld_id)],
            "ps_enable" if query => vec![cmd.echo(&self.enable)],
            "ps_comment" => {
                self.comment = unquote(cmd.args);
                ok()
            }
            "ps_tpldid" => match cmd.args.parse::<u32>() {
                Ok(id) if id <= MAX_TPLD => {
                    self.tpld_id = id;
                    ok()
                }
                _ => error("BADVALUE"),
            },
            "ps_enable" => match cmd.args.to_ascii_uppercase().as_str() {
                state @ ("ON" | "OFF" | "SUPPRESS") => {
                    self.enable = state.to_string();
                    ok()
                }
                _ => error("BADVALUE"),
            },
            _ => syntax_error(),
        }
    }
}

fn join<'a>(values: impl Iterator<Item = &'a u32>) -> String {
    values.map(u32::to_string).collect::<Vec<_>>().join(" ")
}

fn insert_unique(inserted: bool) -> Vec<String> {
    if inserted {
        ok()
    } else {
        error("BADINDEX")
    }
}

fn removed(existed: bool) -> Vec<String> {
    if existed {
        ok()
    } else {
        error("BADINDEX")
    }
}
