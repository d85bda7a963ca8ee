/// A single classified reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `<OK>`, the command was accepted.
    Ok,
    /// `<SYNC>`, end of a bulk block.
    Sync,
    /// The chassis rejected the command. `reason` is the token between the angle
    /// brackets (`NOTRESERVED`, `BADVALUE`, ...) or the text following `#`.
    Error { reason: String },
    /// A value line echoing the queried command.
    Data(DataLine),
    /// An empty line.
    Blank,
}

impl Reply {
    /// Classifies a line with the terminator already removed.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if line.is_empty() {
            return Self::Blank;
        }

        if let Some(token) = line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) {
            return match token.trim().to_ascii_uppercase().as_str() {
                "OK" => Self::Ok,
                "SYNC" => Self::Sync,
                reason => Self::Error { reason: reason.to_string() },
            };
        }

        if let Some(reason) = line.strip_prefix('#') {
            return Self::Error { reason: reason.trim().to_string() };
        }

        Self::Data(DataLine::parse(line))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// A value line: `[address] TOKEN [\[sub\]] value...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLine {
    address: Option<String>,
    token: String,
    sub: Option<String>,
    value: String,
}

impl DataLine {
    fn parse(line: &str) -> Self {
        let (first, mut rest) = split_word(line);

        let (address, token) = if first.starts_with(|c: char| c.is_ascii_digit()) {
            let (token, tail) = split_word(rest);
            rest = tail;
            (Some(first.to_string()), token)
        } else {
            (None, first)
        };

        let mut sub = None;
        if let Some(bracketed) = rest.strip_prefix('[') {
            if let Some((inner, tail)) = bracketed.split_once(']') {
                sub = Some(inner.trim().to_string());
                rest = tail.trim_start();
            }
        }

        Self { address, token: token.to_ascii_lowercase(), sub, value: rest.trim().to_string() }
    }

    /// The `module` or `module/port` address echoed by the chassis.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// The echoed command token, lowercase.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn sub_index(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    /// The raw value, exactly as sent.
    pub fn raw_value(&self) -> &str {
        &self.value
    }

    /// The value with a single pair of enclosing double quotes removed.
    pub fn value(&self) -> &str {
        self.value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .filter(|v| !v.contains('"'))
            .unwrap_or(&self.value)
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}
