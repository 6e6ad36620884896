//! HTTP Digest access authentication ([RFC 2617](https://www.rfc-editor.org/rfc/rfc2617)),
//! the only scheme the device supports.

use std::str::FromStr;

use crate::{api::transport::Credentials, prelude::*};

/// Parsed `WWW-Authenticate: Digest …` challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,

    /// Whether the server offers `qop=auth`, otherwise the legacy RFC 2069 response is computed.
    pub qop_auth: bool,
}

impl FromStr for Challenge {
    type Err = Error;

    fn from_str(header: &str) -> Result<Self> {
        let parameters = header
            .trim_start()
            .split_once(' ')
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("digest"))
            .map(|(_, parameters)| parameters)
            .ok_or_else(|| Error::Digest(format!("not a digest challenge: `{header}`")))?;

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop = None;
        for (name, value) in split_parameters(parameters) {
            match name.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => qop = Some(value),
                "algorithm" if !value.eq_ignore_ascii_case("md5") => {
                    return Err(Error::Digest(format!("unsupported algorithm `{value}`")));
                }
                _ => {}
            }
        }

        let qop_auth = match qop {
            None => false,
            Some(qop) if qop.split(',').any(|option| option.trim() == "auth") => true,
            Some(qop) => return Err(Error::Digest(format!("unsupported qop `{qop}`"))),
        };
        Ok(Self {
            realm: realm.ok_or_else(|| Error::Digest("missing realm".into()))?,
            nonce: nonce.ok_or_else(|| Error::Digest("missing nonce".into()))?,
            opaque,
            qop_auth,
        })
    }
}

impl Challenge {
    /// Build the `Authorization` header value answering the challenge.
    #[must_use]
    pub fn authorize(
        &self,
        credentials: &Credentials,
        method: &str,
        uri: &str,
        client_nonce: &str,
        nonce_count: u32,
    ) -> String {
        let ha1 = hex_md5(&format!(
            "{}:{}:{}",
            credentials.username, self.realm, credentials.password
        ));
        let ha2 = hex_md5(&format!("{method}:{uri}"));
        let nonce_count = format!("{nonce_count:08x}");

        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{uri}", algorithm=MD5"#,
            credentials.username, self.realm, self.nonce,
        );
        if self.qop_auth {
            let response =
                hex_md5(&format!("{ha1}:{}:{nonce_count}:{client_nonce}:auth:{ha2}", self.nonce));
            header.push_str(&format!(
                r#", response="{response}", qop=auth, nc={nonce_count}, cnonce="{client_nonce}""#
            ));
        } else {
            let response = hex_md5(&format!("{ha1}:{}:{ha2}", self.nonce));
            header.push_str(&format!(r#", response="{response}""#));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{opaque}""#));
        }
        header
    }
}

fn hex_md5(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Split `name=value, name="quoted, value"` pairs.
fn split_parameters(parameters: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = parameters.chars().peekable();
    loop {
        while chars.next_if(|char| *char == ',' || char.is_whitespace()).is_some() {}
        let name: String = chars.by_ref().take_while(|char| *char != '=').collect();
        if name.is_empty() {
            break;
        }
        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(char) = chars.next() {
                match char {
                    '"' => break,
                    '\\' => value.extend(chars.next()),
                    _ => value.push(char),
                }
            }
        } else {
            value.extend(chars.by_ref().take_while(|char| *char != ','));
        }
        pairs.push((name.trim().to_owned(), value.trim().to_owned()));
    }
    pairs
}
