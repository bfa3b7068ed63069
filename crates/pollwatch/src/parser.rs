//! Best-effort extraction of a request shape from a captured `curl` command.
//!
//! Only the target URL is mandatory. Headers without a colon and cookie
//! segments without `=` are skipped, and a missing cookie or body flag simply
//! leaves that part of the descriptor empty.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use tracing::debug;

use crate::descriptor::RequestDescriptor;
use crate::error::ParseError;

/// Name of the form key whose value becomes the descriptor's body field
pub const BODY_FIELD_KEY: &str = "stage";

struct CommandPatterns {
    url: Regex,
    header: Regex,
    cookie_short: Regex,
    cookie_long: Regex,
    data_raw: Regex,
    data: Regex,
    body_field: Regex,
}

impl CommandPatterns {
    fn compile() -> Result<Self, regex::Error> {
        let quoted = |flag: &str| Regex::new(&format!(r#"{flag}\s+['"]([^'"]+)['"]"#));

        Ok(Self {
            url: Regex::new(r#"curl\s+['"](https?://[^'"]+)['"]"#)?,
            header: quoted("-H")?,
            cookie_short: quoted("-b")?,
            cookie_long: quoted("--cookie")?,
            data_raw: quoted("--data-raw")?,
            data: quoted("--data")?,
            body_field: Regex::new(&format!(r"(?:^|&){BODY_FIELD_KEY}=([^&]+)"))?,
        })
    }
}

static PATTERNS: LazyLock<Result<CommandPatterns, regex::Error>> =
    LazyLock::new(CommandPatterns::compile);

/// Parse a captured command into a [`RequestDescriptor`]
///
/// ```rust
/// let descriptor = pollwatch::parse_command("curl 'https://x.test/q' -b 'a=1'")?;
/// assert_eq!(descriptor.cookie_header(), "a=1");
/// # Ok::<(), pollwatch::ParseError>(())
/// ```
pub fn parse_command(command: &str) -> Result<RequestDescriptor, ParseError> {
    let patterns =
        PATTERNS.as_ref().map_err(|error| ParseError::Internal(error.to_string()))?;

    let url = patterns
        .url
        .captures(command)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ParseError::MissingUrl)?;
    debug!(url, "Parsed target URL");

    let mut descriptor = RequestDescriptor::new(url)?;

    for caps in patterns.header.captures_iter(command) {
        let token = &caps[1];
        match token.split_once(':') {
            Some((name, value)) => {
                debug!(name = name.trim(), value = value.trim(), "Parsed header");
                descriptor = descriptor.with_header(name.trim(), value.trim());
            }
            None => debug!(token, "Skipping header without a colon"),
        }
    }

    if let Some(cookies) = first_quoted(command, &[&patterns.cookie_short, &patterns.cookie_long]) {
        for (key, value) in split_cookie_pairs(cookies) {
            debug!(key, value, "Parsed cookie");
            descriptor = descriptor.with_cookie(key, value);
        }
    }

    if let Some(body) = first_quoted(command, &[&patterns.data_raw, &patterns.data]) {
        if let Some(caps) = patterns.body_field.captures(body) {
            let field = percent_decode_str(&caps[1]).decode_utf8_lossy().into_owned();
            debug!(field = %field, "Parsed body field");
            descriptor = descriptor.with_body_field(field);
        }
    }

    Ok(descriptor)
}

/// Split a raw cookie string on `;` then on the first `=` of each segment,
/// dropping segments that carry no `=`
pub fn split_cookie_pairs(raw: &str) -> Vec<(&str, &str)> {
    raw.split(';')
        .filter_map(|segment| segment.trim().split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect()
}

/// Quoted value of the first flag spelling that is present
fn first_quoted<'a>(command: &'a str, flags: &[&Regex]) -> Option<&'a str> {
    flags
        .iter()
        .find_map(|flag| flag.captures(command).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str())
}
