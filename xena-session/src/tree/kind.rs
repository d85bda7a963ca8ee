use std::fmt;

/// How the children of a kind are kept in sync with the chassis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Only exists locally. Never enumerated from the chassis.
    Local,
    /// Enumerated on first access, then served from the tree until the parent is reset
    /// or re-scanned.
    Persistent,
    /// Re-enumerated on every access, because the chassis adds and removes them on its
    /// own (payload tags while traffic runs, captured packets).
    Refetch,
}

/// The type tag of a resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Session,
    Chassis,
    Module,
    Port,
    Stream,
    Filter,
    Match,
    Length,
    Capture,
    CapturePacket,
    Tpld,
}

impl Kind {
    /// Command token prefix of the kind.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Session => "",
            Self::Chassis => "c_",
            Self::Module => "m_",
            Self::Port => "p_",
            Self::Stream => "ps_",
            Self::Filter => "pf_",
            Self::Match => "pm_",
            Self::Length => "pl_",
            Self::Capture | Self::CapturePacket => "pc_",
            Self::Tpld => "pr_tpld",
        }
    }

    pub const fn cache_policy(self) -> CachePolicy {
        match self {
            Self::Session | Self::Chassis | Self::Capture => CachePolicy::Local,
            Self::Module
            | Self::Port
            | Self::Stream
            | Self::Filter
            | Self::Match
            | Self::Length => CachePolicy::Persistent,
            Self::Tpld | Self::CapturePacket => CachePolicy::Refetch,
        }
    }

    /// Port attribute listing the indices of the currently existing sub-resources.
    pub const fn indices_token(self) -> Option<&'static str> {
        match self {
            Self::Stream => Some("ps_indices"),
            Self::Filter => Some("pf_indices"),
            Self::Match => Some("pm_indices"),
            Self::Length => Some("pl_indices"),
            Self::Tpld => Some("pr_tplds"),
            _ => None,
        }
    }

    pub const fn create_token(self) -> Option<&'static str> {
        match self {
            Self::Stream => Some("ps_create"),
            Self::Filter => Some("pf_create"),
            Self::Match => Some("pm_create"),
            Self::Length => Some("pl_create"),
            _ => None,
        }
    }

    pub const fn delete_token(self) -> Option<&'static str> {
        match self {
            Self::Stream => Some("ps_delete"),
            Self::Filter => Some("pf_delete"),
            Self::Match => Some("pm_delete"),
            Self::Length => Some("pl_delete"),
            _ => None,
        }
    }

    /// Attribute holding the human label of the resource.
    pub const fn comment_token(self) -> Option<&'static str> {
        match self {
            Self::Stream => Some("ps_comment"),
            Self::Filter => Some("pf_comment"),
            _ => None,
        }
    }

    /// Queries making up the default bulk read of the kind.
    pub const fn info_tokens(self) -> &'static [&'static str] {
        match self {
            Self::Chassis => &["c_info"],
            Self::Module => &["m_info"],
            Self::Port => &["p_info", "p_config", "p_receivesync", "ps_indices", "pr_tplds"],
            Self::Stream => &["ps_config"],
            Self::Filter => &["pf_config"],
            Self::Match => &["pm_config"],
            Self::Length => &["pl_config"],
            Self::Capture => &["pc_fullconfig"],
            Self::CapturePacket => &["pc_info"],
            Self::Session | Self::Tpld => &[],
        }
    }

    /// Counter queries of the kind, in the order the chassis documents them.
    pub const fn stats_tokens(self) -> &'static [&'static str] {
        match self {
            Self::Port => &[
                "pt_total",
                "pt_notpld",
                "pt_extra",
                "pr_total",
                "pr_notpld",
                "pr_extra",
                "pr_pfcstats",
            ],
            Self::Stream => &["pt_stream"],
            Self::Tpld => &["pr_tpldtraffic", "pr_tplderrors", "pr_tpldlatency", "pr_tpldjitter"],
            Self::Capture => &["pc_stats"],
            _ => &[],
        }
    }

    /// Returns `true` for kinds the client creates and deletes explicitly.
    pub const fn is_user_created(self) -> bool {
        self.create_token().is_some()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Chassis => "chassis",
            Self::Module => "module",
            Self::Port => "port",
            Self::Stream => "stream",
            Self::Filter => "filter",
            Self::Match => "match",
            Self::Length => "length",
            Self::Capture => "capture",
            Self::CapturePacket => "cappacket",
            Self::Tpld => "tpld",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
