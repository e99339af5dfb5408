//! The `server` parameter: the server's reply, echoed back by the client on
//! its next request.

use serde::{Deserialize, Serialize};

use super::common::{decode_fields, encode_fields, parse_versions, take_required};
use super::error::CodecError;
use super::tif::Tif;
use crate::nut::Nut;

/// The values sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMsg {
    pub versions: Vec<String>,
    /// The nut the client must present on its next request.
    pub nut: Nut,
    pub tif: Tif,
    /// Path and query the client should post its next request to.
    pub qry: String,
    /// Redirect target handed to a CPS client after a successful `ident`.
    pub url: Option<String>,
}

impl ServerMsg {
    pub fn new(versions: Vec<String>, nut: Nut, qry: impl Into<String>) -> Self {
        Self {
            versions,
            nut,
            tif: Tif::NONE,
            qry: qry.into(),
            url: None,
        }
    }

    /// Sets the given flag(s) on the reply.
    pub fn set(&mut self, flag: Tif) {
        self.tif.set(flag);
    }

    pub fn clear(&mut self, flag: Tif) {
        self.tif.clear(flag);
    }

    /// Whether any bit of `flag` is set on the reply.
    pub fn is(&self, flag: Tif) -> bool {
        self.tif.has(flag)
    }

    /// Encodes the reply as the body of a `/cli.sqrl` response.
    pub fn encode(&self) -> Result<String, CodecError> {
        let mut fields = vec![
            ("ver", self.versions.join(",")),
            ("nut", self.nut.to_string()),
            ("tif", self.tif.to_string()),
            ("qry", self.qry.clone()),
        ];
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            fields.push(("url", url.to_string()));
        }
        Ok(encode_fields(fields))
    }

    /// Decodes a `server` parameter. Fields other than `ver`, `nut`, `tif`,
    /// `qry` and `url` are ignored.
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        let mut fields = decode_fields(raw)?;

        let ver = take_required(&mut fields, "ver")?;
        let nut = take_required(&mut fields, "nut")?;
        let tif = take_required(&mut fields, "tif")?;
        let qry = take_required(&mut fields, "qry")?;

        let tif = tif
            .parse::<u32>()
            .map(Tif::from_bits)
            .map_err(|_| CodecError::InvalidTif(tif))?;

        Ok(Self {
            versions: parse_versions(&ver)?,
            nut: Nut::from(nut),
            tif,
            qry,
            url: fields.remove("url").filter(|u| !u.is_empty()),
        })
    }
}
