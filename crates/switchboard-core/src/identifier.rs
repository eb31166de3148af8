// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifier resolution: normalization and validation of protocol addresses.
//!
//! Three address kinds are recognized:
//! - **direct**: `<digits>@s.whatsapp.net` (a phone-number-like endpoint)
//! - **group**: `<digits>[-<digits>]@g.us`
//! - **broadcast**: `status@broadcast` or `<digits>@broadcast`
//!
//! Raw phone numbers go through the Brazilian numbering rule: a 13-digit
//! `55 DD 9 NNNNNNNN` number drops its extra `9` when the area code is at
//! least 31 and the first subscriber digit is at least 7. The rule is kept
//! exactly as the messaging network applies it and is not generalized to
//! other plans.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SwitchboardError;

pub const DIRECT_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";
pub const BROADCAST_SERVER: &str = "broadcast";
const LEGACY_DIRECT_SERVER: &str = "c.us";

/// Country code of the ambiguous numbering plan.
const BR_COUNTRY_CODE: &str = "55";
/// Index of the optional mobile digit in a Brazilian number.
pub const BR_MOBILE_DIGIT_INDEX: usize = 4;
const BR_LONG_LEN: usize = 13;
const BR_SHORT_LEN: usize = 12;
const BR_MIN_AREA_CODE: u32 = 31;
const BR_MIN_SUBSCRIBER_DIGIT: u32 = 7;

static DIRECT_USER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{8,15}$").unwrap());
static GROUP_USER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{5,}(-\d{5,})?$").unwrap());
static BROADCAST_USER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(status|\d{5,})$").unwrap());

/// The kind of endpoint an identifier addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Direct,
    Group,
    Broadcast,
}

/// A canonical protocol address, `user@server`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jid {
    user: String,
    server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
        }
    }

    pub fn direct(user: impl Into<String>) -> Self {
        Self::new(user, DIRECT_SERVER)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Address kind derived from the server part, if recognized.
    pub fn kind(&self) -> Option<AddressKind> {
        match self.server.as_str() {
            DIRECT_SERVER => Some(AddressKind::Direct),
            GROUP_SERVER => Some(AddressKind::Group),
            BROADCAST_SERVER => Some(AddressKind::Broadcast),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind() == Some(AddressKind::Group)
    }

    pub fn is_broadcast(&self) -> bool {
        self.kind() == Some(AddressKind::Broadcast)
    }

    /// `+<digits>` for direct addresses, the form helpdesk contacts carry.
    pub fn phone_number(&self) -> Option<String> {
        (self.kind() == Some(AddressKind::Direct)).then(|| format!("+{}", self.user))
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

/// Normalize a raw identifier into its canonical form.
///
/// Qualified identifiers (`user@server`) are taken as the network reports them,
/// minus any device/agent suffix. Bare numbers lose formatting characters and a
/// leading `+`, then go through the Brazilian primary-form rule.
pub fn normalize(raw: &str) -> Result<Jid, SwitchboardError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SwitchboardError::Validation("identifier is empty".into()));
    }

    if let Some((user, server)) = raw.rsplit_once('@') {
        return normalize_qualified(user, server);
    }

    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '.'))
        .collect();
    let compact = compact.strip_prefix('+').unwrap_or(&compact);

    // Legacy group ids are `<creator>-<timestamp>`.
    if compact.contains('-') && compact.len() >= 24 {
        if !GROUP_USER.is_match(compact) {
            return Err(SwitchboardError::Validation(format!(
                "malformed group identifier `{raw}`"
            )));
        }
        return Ok(Jid::new(compact, GROUP_SERVER));
    }

    let digits: String = compact.chars().filter(|c| *c != '-').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(SwitchboardError::Validation(format!(
            "identifier `{raw}` is not a phone number"
        )));
    }

    if digits.len() >= 18 {
        return Ok(Jid::new(digits, GROUP_SERVER));
    }

    Ok(Jid::direct(brazilian_primary_form(&digits)))
}

fn normalize_qualified(user: &str, server: &str) -> Result<Jid, SwitchboardError> {
    let server = server.trim().to_ascii_lowercase();
    let server = if server == LEGACY_DIRECT_SERVER {
        DIRECT_SERVER.to_string()
    } else {
        server
    };

    let user = user.trim();
    let user = if server == DIRECT_SERVER {
        // `user.agent:device` -> `user`
        let user = user.split(':').next().unwrap_or(user);
        user.split('.').next().unwrap_or(user)
    } else {
        user
    };

    let jid = Jid::new(user, server);
    if jid.kind().is_none() {
        return Err(SwitchboardError::Validation(format!(
            "unrecognized identifier server `{}`",
            jid.server
        )));
    }
    Ok(jid)
}

/// Apply the Brazilian primary-form rule to a digit string.
fn brazilian_primary_form(digits: &str) -> String {
    if digits.len() != BR_LONG_LEN || !digits.starts_with(BR_COUNTRY_CODE) {
        return digits.to_string();
    }
    let area_code: u32 = digits[2..4].parse().unwrap_or(0);
    let first_subscriber_digit = digits[5..6].parse::<u32>().unwrap_or(0);
    if first_subscriber_digit < BR_MIN_SUBSCRIBER_DIGIT || area_code < BR_MIN_AREA_CODE {
        return digits.to_string();
    }
    let mut short = String::with_capacity(BR_SHORT_LEN);
    short.push_str(&digits[..BR_MOBILE_DIGIT_INDEX]);
    short.push_str(&digits[BR_MOBILE_DIGIT_INDEX + 1..]);
    short
}

/// The other Brazilian variant of a direct address, differing only by the
/// mobile `9` at [`BR_MOBILE_DIGIT_INDEX`]. `None` outside that plan.
pub fn alternate_form(jid: &Jid) -> Option<Jid> {
    if jid.kind() != Some(AddressKind::Direct)
        || !jid.user.starts_with(BR_COUNTRY_CODE)
        || !jid.user.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let user = &jid.user;
    let alternate = match user.len() {
        BR_LONG_LEN => format!(
            "{}{}",
            &user[..BR_MOBILE_DIGIT_INDEX],
            &user[BR_MOBILE_DIGIT_INDEX + 1..]
        ),
        BR_SHORT_LEN => format!(
            "{}9{}",
            &user[..BR_MOBILE_DIGIT_INDEX],
            &user[BR_MOBILE_DIGIT_INDEX..]
        ),
        _ => return None,
    };
    Some(Jid::direct(alternate))
}

/// Shape check against the recognized address kinds.
pub fn is_valid(jid: &Jid) -> bool {
    match jid.kind() {
        Some(AddressKind::Direct) => DIRECT_USER.is_match(&jid.user),
        Some(AddressKind::Group) => GROUP_USER.is_match(&jid.user),
        Some(AddressKind::Broadcast) => BROADCAST_USER.is_match(&jid.user),
        None => false,
    }
}

/// Normalize and validate in one step.
pub fn resolve(raw: &str) -> Result<Jid, SwitchboardError> {
    let jid = normalize(raw)?;
    if !is_valid(&jid) {
        return Err(SwitchboardError::Validation(format!(
            "`{raw}` does not resolve to a valid address"
        )));
    }
    Ok(jid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_formatting_and_plus() {
        let jid = normalize("+1 (415) 555-0100").unwrap();
        assert_eq!(jid.to_string(), "14155550100@s.whatsapp.net");
        assert!(is_valid(&jid));
    }

    #[test]
    fn brazilian_high_area_code_drops_mobile_digit() {
        // DDD 31, first subscriber digit 8 -> short form is primary.
        let jid = normalize("+55 (31) 9 8765-4321").unwrap();
        assert_eq!(jid.user(), "553187654321");
        assert!(is_valid(&jid));
    }

    #[test]
    fn brazilian_low_area_code_keeps_mobile_digit() {
        let jid = normalize("+55 11 98765-4321").unwrap();
        assert_eq!(jid.user(), "5511987654321");
    }

    #[test]
    fn brazilian_low_subscriber_digit_keeps_mobile_digit() {
        // DDD 41 but subscriber starts with 3 (landline-like) -> unchanged.
        let jid = normalize("5541932104321").unwrap();
        assert_eq!(jid.user(), "5541932104321");
    }

    #[test]
    fn alternate_form_differs_by_one_digit_at_index_four() {
        let primary = normalize("+55 31 98765-4321").unwrap();
        let alternate = alternate_form(&primary).expect("brazilian number has an alternate");
        assert_ne!(primary, alternate);
        assert!(is_valid(&alternate));
        assert_eq!(alternate.user(), "5531987654321");
        assert_eq!(alternate.user().len(), primary.user().len() + 1);
        assert_eq!(&alternate.user()[BR_MOBILE_DIGIT_INDEX..=BR_MOBILE_DIGIT_INDEX], "9");
        let mut reconstructed = alternate.user().to_string();
        reconstructed.remove(BR_MOBILE_DIGIT_INDEX);
        assert_eq!(reconstructed, primary.user());
    }

    #[test]
    fn no_alternate_outside_brazil() {
        let jid = normalize("14155550100").unwrap();
        assert!(alternate_form(&jid).is_none());
        let group = normalize("120363025246125486@g.us").unwrap();
        assert!(alternate_form(&group).is_none());
    }

    #[test]
    fn no_alternate_for_non_digit_user() {
        // 13 bytes, with a two-byte character across the mobile digit index.
        let jid = Jid::new("551\u{e9}12345678", "s.whatsapp.net");
        assert_eq!(jid.user().len(), BR_LONG_LEN);
        assert!(alternate_form(&jid).is_none());
        let qualified = normalize("551\u{e9}12345678@s.whatsapp.net").unwrap();
        assert!(alternate_form(&qualified).is_none());
    }

    #[test]
    fn qualified_identifiers_keep_their_server() {
        let jid = normalize("5511987654321.0:12@s.whatsapp.net").unwrap();
        assert_eq!(jid.to_string(), "5511987654321@s.whatsapp.net");

        let legacy = normalize("5511987654321@c.us").unwrap();
        assert_eq!(legacy.server(), DIRECT_SERVER);

        let group = normalize("120363025246125486@g.us").unwrap();
        assert_eq!(group.kind(), Some(AddressKind::Group));
        assert!(is_valid(&group));

        let status = normalize("status@broadcast").unwrap();
        assert!(status.is_broadcast());
        assert!(is_valid(&status));
    }

    #[test]
    fn long_numbers_are_groups() {
        let jid = normalize("120363025246125486").unwrap();
        assert!(jid.is_group());
        let legacy = normalize("5511987654321-1612345678").unwrap();
        assert!(legacy.is_group());
        assert!(is_valid(&legacy));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(normalize(""), Err(SwitchboardError::Validation(_))));
        assert!(matches!(
            normalize("call-me-maybe"),
            Err(SwitchboardError::Validation(_))
        ));
        assert!(matches!(
            normalize("123@example.com"),
            Err(SwitchboardError::Validation(_))
        ));
    }

    #[test]
    fn short_numbers_normalize_but_are_invalid() {
        let jid = normalize("12345").unwrap();
        assert!(!is_valid(&jid));
        assert!(resolve("12345").is_err());
    }

    #[test]
    fn phone_number_only_for_direct() {
        let jid = normalize("5511987654321").unwrap();
        assert_eq!(jid.phone_number().as_deref(), Some("+5511987654321"));
        assert!(normalize("status@broadcast").unwrap().phone_number().is_none());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(area in 11u32..100, subscriber in 10_000_000u32..100_000_000) {
            let raw = format!("+55 {area} 9{subscriber}");
            let once = normalize(&raw).unwrap();
            let twice = normalize(&once.to_string()).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn alternate_form_is_an_involution(area in 11u32..100, subscriber in 10_000_000u32..100_000_000) {
            let jid = normalize(&format!("55{area}9{subscriber}")).unwrap();
            let alternate = alternate_form(&jid).unwrap();
            prop_assert!(is_valid(&alternate));
            prop_assert_eq!(alternate_form(&alternate).unwrap(), jid);
        }
    }
}
