//! HTTP method as a typed enum.
//!
//! Only the methods an endpoint can bind a handler to are represented. Any
//! other token (`HEAD`, `TRACE`, WebDAV verbs, garbage) never parses, so the
//! registry answers it the same way it answers an unbound method: `404`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A method an endpoint can register a handler for.
///
/// Declaration order is the order signatures are reported in.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Post,
    Get,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    /// Every bindable method, in declaration order.
    pub const ALL: [Method; 6] = [
        Self::Post,
        Self::Get,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Options,
    ];

    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
        }
    }
}

/// Parses a method token, ignoring ASCII case (`"get"`, `"GET"` and `"Get"`
/// all resolve to [`Method::Get`]).
impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMethod(s.to_owned()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method token that does not name a bindable [`Method`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown method `{0}`")]
pub struct UnknownMethod(pub String);
