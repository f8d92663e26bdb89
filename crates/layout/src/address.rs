use shared::error::LayoutError;

/// One segment of a slash-delimited address pattern. A `*` segment
/// matches any single inbound segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Wildcard,
}

/// A widget address, compiled into segments once at load time so routing
/// never re-parses pattern strings per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPattern {
    raw: String,
    segments: Vec<Segment>,
}

fn split_address(address: &str) -> Option<Vec<&str>> {
    let rest = address.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    Some(parts)
}

impl AddressPattern {
    pub fn compile(widget: &str, raw: &str) -> Result<Self, LayoutError> {
        let parts = split_address(raw).ok_or_else(|| LayoutError::BadAddress {
            widget: widget.to_string(),
            address: raw.to_string(),
        })?;
        let segments = parts
            .into_iter()
            .map(|part| {
                if part == "*" {
                    Segment::Wildcard
                } else {
                    Segment::Literal(part.to_string())
                }
            })
            .collect();
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// True when the pattern contains no wildcard segment.
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    fn match_parts<'a>(&self, parts: &[&'a str]) -> Option<Option<&'a str>> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut captured = None;
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(text) if text == part => {}
                Segment::Literal(_) => return None,
                Segment::Wildcard => captured = Some(*part),
            }
        }
        Some(captured)
    }

    pub fn matches(&self, address: &str) -> bool {
        self.match_capture(address).is_some()
    }

    /// `None` on no match; `Some(None)` on a literal match; `Some(tok)`
    /// when a wildcard segment captured `tok`.
    pub fn match_capture<'a>(&self, address: &'a str) -> Option<Option<&'a str>> {
        let parts = split_address(address)?;
        self.match_parts(&parts)
    }

    /// Matches the pattern followed by exactly one extra trailing
    /// segment, returning that segment. Used for split matrix widgets
    /// whose cells live at `<address>/<index>`.
    pub fn match_cell_suffix<'a>(&self, address: &'a str) -> Option<&'a str> {
        let parts = split_address(address)?;
        if parts.len() != self.segments.len() + 1 {
            return None;
        }
        let (suffix, base) = parts.split_last()?;
        self.match_parts(base)?;
        Some(suffix)
    }

    /// Builds a concrete address: a wildcard segment is substituted with
    /// `token`; with no wildcard and a token present, the token is
    /// appended as an extra segment (split-cell addressing).
    pub fn expand(&self, token: Option<&str>) -> String {
        let mut out = String::new();
        let mut substituted = false;
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Wildcard => match token {
                    Some(token) => {
                        out.push_str(token);
                        substituted = true;
                    }
                    None => out.push('*'),
                },
            }
        }
        if let (Some(token), false) = (token, substituted) {
            out.push('/');
            out.push_str(token);
        }
        out
    }
}
