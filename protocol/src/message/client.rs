//! The `client` parameter: what a SQRL client tells the server.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{decode_fields, encode_fields, parse_versions, take_required};
use super::error::CodecError;
use crate::identity::Identity;

/// The command verb a client is asking the server to perform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Query,
    Ident,
    Disable,
    Enable,
    Remove,
    /// A verb this server doesn't know, kept verbatim.
    Unknown(String),
}

impl Command {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "query" => Command::Query,
            "ident" => Command::Ident,
            "disable" => Command::Disable,
            "enable" => Command::Enable,
            "remove" => Command::Remove,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::Query => "query",
            Command::Ident => "ident",
            Command::Disable => "disable",
            Command::Enable => "enable",
            Command::Remove => "remove",
            Command::Unknown(other) => other,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client option from the `opt=` field.
///
/// Unrecognised tokens are preserved as [`Opt::Unknown`] rather than rejected
/// so newer clients keep working against this server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opt {
    /// Don't fail the request just because the IP changed.
    NoIpTest,
    SqrlOnly,
    HardLock,
    /// Client Provided Session: the client wants the redirect URL directly.
    Cps,
    Suk,
    Unknown(String),
}

impl Opt {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "noiptest" => Opt::NoIpTest,
            "sqrlonly" => Opt::SqrlOnly,
            "hardlock" => Opt::HardLock,
            "cps" => Opt::Cps,
            "suk" => Opt::Suk,
            other => Opt::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Opt::NoIpTest => "noiptest",
            Opt::SqrlOnly => "sqrlonly",
            Opt::HardLock => "hardlock",
            Opt::Cps => "cps",
            Opt::Suk => "suk",
            Opt::Unknown(other) => other,
        }
    }
}

impl fmt::Display for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The values sent by the client to the server.
///
/// Two messages are equal when their options match as a set; the order the
/// client listed them in does not matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMsg {
    /// Protocol versions the client supports.
    pub versions: Vec<String>,
    pub command: Command,
    /// The client's current identity key for this site.
    pub idk: Identity,
    /// Options without duplicates, kept in the order they were sent so
    /// encoding reproduces the client's bytes.
    pub options: Vec<Opt>,
}

impl PartialEq for ClientMsg {
    fn eq(&self, other: &Self) -> bool {
        self.versions == other.versions
            && self.command == other.command
            && self.idk == other.idk
            && self.options.iter().all(|opt| other.options.contains(opt))
            && other.options.iter().all(|opt| self.options.contains(opt))
    }
}

impl Eq for ClientMsg {}

impl ClientMsg {
    pub fn new(versions: Vec<String>, command: Command, idk: Identity) -> Self {
        Self {
            versions,
            command,
            idk,
            options: Vec::new(),
        }
    }

    /// Adds an option; already-present options are ignored.
    pub fn with_opt(mut self, opt: Opt) -> Self {
        self.insert_opt(opt);
        self
    }

    pub fn insert_opt(&mut self, opt: Opt) {
        if !self.options.contains(&opt) {
            self.options.push(opt);
        }
    }

    /// Whether the client asserted the given option.
    pub fn has_opt(&self, opt: &Opt) -> bool {
        self.options.contains(opt)
    }

    /// Encodes the message for transmission as the `client` parameter.
    pub fn encode(&self) -> Result<String, CodecError> {
        if self.versions.is_empty() || self.command.as_str().is_empty() || self.idk.is_empty() {
            return Err(CodecError::IncompleteMessage);
        }

        let mut fields = vec![
            ("ver", self.versions.join(",")),
            ("cmd", self.command.to_string()),
            ("idk", self.idk.to_string()),
        ];
        if !self.options.is_empty() {
            let opts: Vec<&str> = self.options.iter().map(Opt::as_str).collect();
            fields.push(("opt", opts.join("~")));
        }
        Ok(encode_fields(fields))
    }

    /// Decodes a `client` parameter.
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        let mut fields = decode_fields(raw)?;

        let ver = take_required(&mut fields, "ver")?;
        let cmd = take_required(&mut fields, "cmd")?;
        let idk = take_required(&mut fields, "idk")?;

        let mut msg = ClientMsg::new(parse_versions(&ver)?, Command::parse(&cmd), Identity::new(idk));
        if let Some(opt) = fields.remove("opt") {
            for token in opt.split('~').filter(|t| !t.is_empty()) {
                msg.insert_opt(Opt::parse(token));
            }
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encode_b64;

    const VALID_IDK: &str = "Vl4KVVRoG0C8v1VP0UEUNK2z_SYhNVYBXdoarhMljzQ";

    fn basic_query() -> ClientMsg {
        ClientMsg::new(vec!["1".into()], Command::Query, Identity::new(VALID_IDK))
    }

    #[test]
    fn test_option_order_does_not_affect_equality() {
        let a = basic_query().with_opt(Opt::Cps).with_opt(Opt::Suk);
        let b = basic_query().with_opt(Opt::Suk).with_opt(Opt::Cps);
        assert_eq!(a, b);
        assert_ne!(a, basic_query().with_opt(Opt::Cps));
        assert_ne!(a, basic_query().with_opt(Opt::Cps).with_opt(Opt::NoIpTest));

        let decoded = ClientMsg::decode(&encode_b64(
            format!("ver=1\r\ncmd=query\r\nidk={VALID_IDK}\r\nopt=suk~cps\r\n").as_bytes(),
        ))
        .unwrap();
        assert_eq!(decoded, a);
    }

    #[test]
    fn test_encode_basic_query() {
        assert_eq!(
            basic_query().encode().unwrap(),
            "dmVyPTENCmNtZD1xdWVyeQ0KaWRrPVZsNEtWVlJvRzBDOHYxVlAwVUVVTksyel9TWWhOVllCWGRvYXJoTWxqelENCg"
        );
    }

    #[test]
    fn test_encode_single_option() {
        assert_eq!(
            basic_query().with_opt(Opt::Cps).encode().unwrap(),
            "dmVyPTENCmNtZD1xdWVyeQ0KaWRrPVZsNEtWVlJvRzBDOHYxVlAwVUVVTksyel9TWWhOVllCWGRvYXJoTWxqelENCm9wdD1jcHMNCg"
        );
    }

    #[test]
    fn test_encode_two_options_keeps_order() {
        assert_eq!(
            basic_query()
                .with_opt(Opt::Cps)
                .with_opt(Opt::SqrlOnly)
                .encode()
                .unwrap(),
            "dmVyPTENCmNtZD1xdWVyeQ0KaWRrPVZsNEtWVlJvRzBDOHYxVlAwVUVVTksyel9TWWhOVllCWGRvYXJoTWxqelENCm9wdD1jcHN-c3FybG9ubHkNCg"
        );
    }

    #[test]
    fn test_encode_rejects_incomplete_messages() {
        let missing_ver = ClientMsg::new(vec![], Command::Query, Identity::new(VALID_IDK));
        let missing_cmd = ClientMsg::new(
            vec!["1".into()],
            Command::Unknown(String::new()),
            Identity::new(VALID_IDK),
        );
        let missing_idk = ClientMsg::new(vec!["1".into()], Command::Query, Identity::default());

        for msg in [missing_ver, missing_cmd, missing_idk] {
            assert_eq!(msg.encode(), Err(CodecError::IncompleteMessage));
        }
    }

    #[test]
    fn test_decode_lf_and_crlf() {
        let lf = ClientMsg::decode(
            "dmVyPTEKY21kPXF1ZXJ5Cmlkaz1WbDRLVlZSb0cwQzh2MVZQMFVFVU5LMnpfU1loTlZZQlhkb2FyaE1sanpRCg",
        )
        .unwrap();
        let crlf = ClientMsg::decode(
            "dmVyPTENCmNtZD1xdWVyeQ0KaWRrPVZsNEtWVlJvRzBDOHYxVlAwVUVVTksyel9TWWhOVllCWGRvYXJoTWxqelENCg",
        )
        .unwrap();
        assert_eq!(lf, basic_query());
        assert_eq!(crlf, basic_query());
        assert!(crlf.options.is_empty());
    }

    #[test]
    fn test_decode_two_options() {
        let msg = ClientMsg::decode(
            "dmVyPTENCmNtZD1xdWVyeQ0KaWRrPVZsNEtWVlJvRzBDOHYxVlAwVUVVTksyel9TWWhOVllCWGRvYXJoTWxqelENCm9wdD1jcHN-c3FybG9ubHkNCg",
        )
        .unwrap();
        assert_eq!(msg.options, vec![Opt::Cps, Opt::SqrlOnly]);
        assert!(msg.has_opt(&Opt::Cps));
        assert!(!msg.has_opt(&Opt::NoIpTest));
    }

    #[test]
    fn test_decode_preserves_unknown_options_and_commands() {
        let raw = encode_b64(format!("ver=1,2\r\ncmd=frobnicate\r\nidk={VALID_IDK}\r\nopt=noiptest~future\r\n").as_bytes());
        let msg = ClientMsg::decode(&raw).unwrap();
        assert_eq!(msg.versions, vec!["1", "2"]);
        assert_eq!(msg.command, Command::Unknown("frobnicate".into()));
        assert_eq!(msg.options, vec![Opt::NoIpTest, Opt::Unknown("future".into())]);
    }

    #[test]
    fn test_decode_rejects_invalid_input() {
        let idk = "PO2ib4BeITiKHTOGW37Mv03dES29DfhJPl6bq5JijoA";
        let cases = [
            ("empty", String::new()),
            ("not base64", "notbase64!!@!@£$".to_string()),
            ("only whitespace", "         ".to_string()),
            ("duplicate fields", encode_b64(format!("ver=1\nver=1\ncmd=query\nidk={idk}").as_bytes())),
            ("missing idk", encode_b64(b"ver=1\ncmd=query")),
            ("missing cmd", encode_b64(format!("ver=1\nidk={idk}").as_bytes())),
            ("missing ver", encode_b64(format!("cmd=query\nidk={idk}").as_bytes())),
            ("empty ver", encode_b64(format!("ver=\ncmd=query\nidk={idk}").as_bytes())),
        ];

        for (name, input) in cases {
            assert!(ClientMsg::decode(&input).is_err(), "{name} should fail");
        }
    }

    #[test]
    fn test_decode_missing_parameter_names_field() {
        let raw = encode_b64(b"ver=1\ncmd=query");
        assert_eq!(
            ClientMsg::decode(&raw),
            Err(CodecError::MissingRequiredParameter("idk"))
        );
    }

    #[test]
    fn test_roundtrip_with_every_option() {
        let mut msg = ClientMsg::new(vec!["1".into()], Command::Ident, Identity::new(VALID_IDK));
        for opt in ["noiptest", "sqrlonly", "hardlock", "cps", "suk", "x-later"] {
            msg.insert_opt(Opt::parse(opt));
        }
        assert_eq!(ClientMsg::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_duplicate_options_collapse() {
        let raw = encode_b64(format!("ver=1\ncmd=query\nidk={VALID_IDK}\nopt=cps~cps\n").as_bytes());
        assert_eq!(ClientMsg::decode(&raw).unwrap().options, vec![Opt::Cps]);
    }
}
