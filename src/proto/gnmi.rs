//! gNMI message types (`gnmi.proto`, package `gnmi`).
//!
//! Only the messages and fields the Get/Set surface needs are modelled. Field
//! tags match the upstream schema so any gNMI client can talk to the server;
//! unknown fields are skipped on decode.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Data encodings a client may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[derive(Serialize, Deserialize)]
#[repr(i32)]
pub enum Encoding {
    Json = 0,
    Bytes = 1,
    Proto = 2,
    Ascii = 3,
    JsonIetf = 4,
}

/// A path element with optional list keys.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct PathElem {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(map = "string, string", tag = "2")]
    #[serde(default)]
    pub key: HashMap<String, String>,
}

/// A data tree path.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct Path {
    #[prost(string, tag = "2")]
    #[serde(default)]
    pub origin: String,
    #[prost(message, repeated, tag = "3")]
    #[serde(default)]
    pub elem: Vec<PathElem>,
    #[prost(string, tag = "4")]
    #[serde(default)]
    pub target: String,
}

/// Typed leaf value.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct TypedValue {
    #[prost(oneof = "typed_value::Value", tags = "1, 2, 3, 4, 5, 10, 11, 12, 13, 14")]
    pub value: Option<typed_value::Value>,
}

pub mod typed_value {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, PartialEq, prost::Oneof, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Value {
        #[prost(string, tag = "1")]
        StringVal(String),
        #[prost(int64, tag = "2")]
        IntVal(i64),
        #[prost(uint64, tag = "3")]
        UintVal(u64),
        #[prost(bool, tag = "4")]
        BoolVal(bool),
        #[prost(bytes = "vec", tag = "5")]
        BytesVal(Vec<u8>),
        #[prost(bytes = "vec", tag = "10")]
        JsonVal(Vec<u8>),
        #[prost(bytes = "vec", tag = "11")]
        JsonIetfVal(Vec<u8>),
        #[prost(string, tag = "12")]
        AsciiVal(String),
        #[prost(bytes = "vec", tag = "13")]
        ProtoBytes(Vec<u8>),
        #[prost(double, tag = "14")]
        DoubleVal(f64),
    }
}

/// A path and the value to write (or the value read) at it.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct Update {
    #[prost(message, optional, tag = "1")]
    pub path: Option<Path>,
    #[prost(message, optional, tag = "3")]
    pub val: Option<TypedValue>,
    #[prost(uint32, tag = "4")]
    #[serde(default)]
    pub duplicates: u32,
}

/// A set of updates and deletes sharing a timestamp and prefix.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct Notification {
    #[prost(int64, tag = "1")]
    #[serde(default)]
    pub timestamp: i64,
    #[prost(message, optional, tag = "2")]
    pub prefix: Option<Path>,
    #[prost(message, repeated, tag = "4")]
    #[serde(default)]
    pub update: Vec<Update>,
    #[prost(message, repeated, tag = "5")]
    #[serde(default)]
    pub delete: Vec<Path>,
    #[prost(bool, tag = "6")]
    #[serde(default)]
    pub atomic: bool,
}

pub mod get_request {
    use serde::{Deserialize, Serialize};

    /// Which slice of the data tree a Get targets.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[derive(Serialize, Deserialize)]
    #[repr(i32)]
    pub enum DataType {
        All = 0,
        Config = 1,
        State = 2,
        Operational = 3,
    }
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct GetRequest {
    #[prost(message, optional, tag = "1")]
    pub prefix: Option<Path>,
    #[prost(message, repeated, tag = "2")]
    #[serde(default)]
    pub path: Vec<Path>,
    #[prost(enumeration = "get_request::DataType", tag = "3")]
    #[serde(default)]
    pub r#type: i32,
    #[prost(enumeration = "Encoding", tag = "5")]
    #[serde(default)]
    pub encoding: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct GetResponse {
    #[prost(message, repeated, tag = "1")]
    #[serde(default)]
    pub notification: Vec<Notification>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct SetRequest {
    #[prost(message, optional, tag = "1")]
    pub prefix: Option<Path>,
    #[prost(message, repeated, tag = "2")]
    #[serde(default)]
    pub delete: Vec<Path>,
    #[prost(message, repeated, tag = "3")]
    #[serde(default)]
    pub replace: Vec<Update>,
    #[prost(message, repeated, tag = "4")]
    #[serde(default)]
    pub update: Vec<Update>,
}

pub mod update_result {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[derive(Serialize, Deserialize)]
    #[repr(i32)]
    pub enum Operation {
        Invalid = 0,
        Delete = 1,
        Replace = 2,
        Update = 3,
    }
}

/// Outcome of a single Set operation.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct UpdateResult {
    #[prost(message, optional, tag = "2")]
    pub path: Option<Path>,
    #[prost(enumeration = "update_result::Operation", tag = "4")]
    #[serde(default)]
    pub op: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct SetResponse {
    #[prost(message, optional, tag = "1")]
    pub prefix: Option<Path>,
    #[prost(message, repeated, tag = "2")]
    #[serde(default)]
    pub response: Vec<UpdateResult>,
    #[prost(int64, tag = "4")]
    #[serde(default)]
    pub timestamp: i64,
}

impl Path {
    /// Parse an xpath-like string such as `interfaces/interface[name=eth0]/state`.
    ///
    /// Leading slashes are ignored. Keys are written `[key=value]` and may
    /// repeat on one element. Slashes inside brackets are part of the value.
    pub fn parse(origin: &str, input: &str) -> Result<Self, PathParseError> {
        let mut elems = Vec::new();
        for segment in split_segments(input)? {
            elems.push(parse_elem(&segment)?);
        }
        Ok(Path {
            origin: origin.to_string(),
            elem: elems,
            target: String::new(),
        })
    }
}

/// Errors from [`Path::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathParseError {
    #[error("unbalanced brackets in path {0:?}")]
    Unbalanced(String),
    #[error("malformed key {0:?}, expected name=value")]
    MalformedKey(String),
    #[error("empty element name in {0:?}")]
    EmptyName(String),
}

fn split_segments(input: &str) -> Result<Vec<String>, PathParseError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in input.trim_start_matches('/').chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| PathParseError::Unbalanced(input.to_string()))?;
                current.push(ch);
            }
            '/' if depth == 0 => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(PathParseError::Unbalanced(input.to_string()));
    }
    if !current.is_empty() {
        segments.push(current);
    }
    Ok(segments)
}

fn parse_elem(segment: &str) -> Result<PathElem, PathParseError> {
    let (name, mut rest) = match segment.find('[') {
        Some(idx) => (&segment[..idx], &segment[idx..]),
        None => (segment, ""),
    };
    if name.is_empty() {
        return Err(PathParseError::EmptyName(segment.to_string()));
    }

    let mut key = HashMap::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        let end = stripped
            .find(']')
            .ok_or_else(|| PathParseError::Unbalanced(segment.to_string()))?;
        let pair = &stripped[..end];
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| PathParseError::MalformedKey(pair.to_string()))?;
        key.insert(k.to_string(), v.to_string());
        rest = &stripped[end + 1..];
    }
    if !rest.is_empty() {
        return Err(PathParseError::MalformedKey(rest.to_string()));
    }

    Ok(PathElem {
        name: name.to_string(),
        key,
    })
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.origin.is_empty() {
            write!(f, "{}:", self.origin)?;
        }
        if self.elem.is_empty() {
            return f.write_str("/");
        }
        for elem in &self.elem {
            write!(f, "/{}", elem.name)?;
            let mut keys: Vec<_> = elem.key.iter().collect();
            keys.sort();
            for (k, v) in keys {
                write!(f, "[{}={}]", k, v)?;
            }
        }
        Ok(())
    }
}
