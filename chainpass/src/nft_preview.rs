// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Ticket NFT metadata with an inline SVG image.
//!
//! Output depends only on the inputs: colors and the background pattern come from a hash of
//! `"<event id>-<ticket id>"`, dates are rendered in UTC, and nothing touches the network or the
//! clock.

use crate::{
    chain::abi::keccak256,
    models::{event::Event, ticket::Ticket},
    utils::util::truncate_str,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

const FOOTER: &str = "Base Sepolia NFT Ticket \u{2022} ChainPass";
/// Longer names overflow the ticket face.
const MAX_HEADING_CHARS: usize = 40;

/// Background patterns, as SVG `<pattern>` bodies on a 40x40 tile.
const PATTERNS: [&str; 5] = [
    r##"<path d="M0 40L40 0M-10 10L10 -10M30 50L50 30" stroke="#000" stroke-opacity="0.07" stroke-width="10"/>"##,
    r##"<rect width="20" height="20" fill="#000" fill-opacity="0.07"/><rect x="20" y="20" width="20" height="20" fill="#000" fill-opacity="0.07"/>"##,
    r##"<circle cx="20" cy="20" r="8" fill="#000" fill-opacity="0.07"/>"##,
    r##"<circle cx="20" cy="20" r="15" fill="none" stroke="#000" stroke-opacity="0.07" stroke-width="5"/><circle cx="20" cy="20" r="5" fill="#000" fill-opacity="0.07"/>"##,
    r##"<path d="M20 0L40 10V30L20 40L0 30V10Z" fill="none" stroke="#000" stroke-opacity="0.07" stroke-width="3"/>"##,
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageEncoding {
    #[default]
    Base64,
    /// Percent-encoded UTF-8, for consumers that cannot take base64 data URIs.
    Utf8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewInput<'a> {
    pub event_id: u64,
    pub ticket_id: u64,
    pub event_name: &'a str,
    /// Seconds since epoch.
    pub start_time: u64,
    pub is_used: bool,
    /// Unknown is rendered as transferable.
    pub is_soulbound: bool,
    pub site_url: Option<&'a str>,
}

impl<'a> PreviewInput<'a> {
    pub fn new(event_id: u64, ticket_id: u64, event_name: &'a str, start_time: u64, is_used: bool) -> Self {
        Self {
            event_id,
            ticket_id,
            event_name,
            start_time,
            is_used,
            is_soulbound: false,
            site_url: None,
        }
    }

    /// Preview of a resolved ticket for `event`.
    pub fn for_ticket(ticket: &Ticket, event: &'a Event) -> Self {
        Self::new(event.id, ticket.id, &event.name, event.start_time, ticket.is_used)
            .soulbound(!event.is_transferable())
    }

    pub fn soulbound(mut self, is_soulbound: bool) -> Self {
        self.is_soulbound = is_soulbound;
        self
    }

    pub fn site_url(mut self, site_url: &'a str) -> Self {
        self.site_url = Some(site_url);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NftAttribute {
    pub trait_type: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NftMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub attributes: Vec<NftAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    /// Six hex digits, no `#`.
    pub background_color: String,
}

/// Colors and pattern picked for one ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Palette {
    background_hue: u16,
    accent_hue: u16,
    pattern: usize,
}

impl Palette {
    fn for_seed(seed: &str) -> Self {
        let hash = keccak256(seed.as_bytes());
        let bytes = seed.as_bytes();
        let first = bytes.first().copied().unwrap_or(0) as usize;
        let second = bytes.get(1).copied().unwrap_or(0) as usize;
        Self {
            background_hue: u16::from_be_bytes([hash[0], hash[1]]) % 360,
            accent_hue: u16::from_be_bytes([hash[2], hash[3]]) % 360,
            pattern: (first + second) % PATTERNS.len(),
        }
    }
}

pub fn generate_ticket_metadata(input: &PreviewInput) -> NftMetadata {
    generate_ticket_metadata_with(input, ImageEncoding::default())
}

pub fn generate_ticket_metadata_with(input: &PreviewInput, encoding: ImageEncoding) -> NftMetadata {
    let palette = Palette::for_seed(&seed(input));
    let date = format_date(input.start_time);
    let attribute = |trait_type: &str, value: String| NftAttribute {
        trait_type: trait_type.to_string(),
        value,
    };
    NftMetadata {
        name: format!("{} Ticket #{}", input.event_name, input.ticket_id),
        description: format!("Access pass for {}. Valid on {}", input.event_name, date),
        image: ticket_image_uri(input, encoding),
        attributes: vec![
            attribute("Event", input.event_name.to_string()),
            attribute("Ticket ID", format!("#{}", input.ticket_id)),
            attribute("Date", date),
            attribute("Status", if input.is_used { "Used" } else { "Valid" }.to_string()),
            attribute(
                "Transferable",
                if input.is_soulbound { "No" } else { "Yes" }.to_string(),
            ),
        ],
        external_url: input
            .site_url
            .map(|site| format!("{}/events/{}", site.trim_end_matches('/'), input.event_id)),
        background_color: pastel_hex(palette.background_hue),
    }
}

/// The ticket artwork as a `data:` URI.
pub fn ticket_image_uri(input: &PreviewInput, encoding: ImageEncoding) -> String {
    let svg = render_svg(input);
    match encoding {
        ImageEncoding::Base64 => format!("data:image/svg+xml;base64,{}", base64::encode(svg.as_bytes())),
        ImageEncoding::Utf8 => format!("data:image/svg+xml;utf8,{}", percent_encode(&svg)),
    }
}

fn seed(input: &PreviewInput) -> String {
    format!("{}-{}", input.event_id, input.ticket_id)
}

fn start_datetime(start_time: u64) -> DateTime<Utc> {
    i64::try_from(start_time)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default()
}

fn format_date(start_time: u64) -> String {
    start_datetime(start_time).format("%Y-%m-%d").to_string()
}

fn format_time(start_time: u64) -> String {
    start_datetime(start_time).format("%H:%M UTC").to_string()
}

fn pastel(hue: u16) -> String {
    format!("hsl({}, 70%, 80%)", hue)
}

/// `hsl(hue, 70%, 80%)` as rgb hex.
fn pastel_hex(hue: u16) -> String {
    let (s, l) = (0.7_f64, 0.8_f64);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let h = f64::from(hue) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match hue / 60 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// `encodeURIComponent`-style: form encoding, with spaces as `%20`.
fn percent_encode(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn render_svg(input: &PreviewInput) -> String {
    let palette = Palette::for_seed(&seed(input));
    let background = pastel(palette.background_hue);
    let accent = pastel(palette.accent_hue);
    let name = xml_escape(&truncate_str(input.event_name, MAX_HEADING_CHARS));

    let mut svg = String::with_capacity(4096);
    // Writing to a String cannot fail.
    let _ = write!(
        svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="800" height="600" viewBox="0 0 800 600">
<defs><pattern id="bg" width="40" height="40" patternUnits="userSpaceOnUse">{pattern}</pattern></defs>
<rect width="800" height="600" fill="{background}"/>
<rect width="800" height="600" fill="url(#bg)"/>
<rect width="800" height="600" fill="{accent}" opacity="0.2"/>
<rect x="40" y="40" width="720" height="520" rx="20" ry="20" fill="white" stroke="#000" stroke-width="2" opacity="0.9"/>
<line x1="200" y1="40" x2="200" y2="560" stroke-dasharray="10,10" stroke="#000" stroke-width="2"/>
<circle cx="120" cy="120" r="60" fill="{accent}"/>
<text x="120" y="125" font-family="Arial" font-size="24" text-anchor="middle" font-weight="bold">NFT</text>
<text x="400" y="100" font-family="Arial" font-size="32" text-anchor="middle" font-weight="bold">{name}</text>
<text x="400" y="150" font-family="Arial" font-size="20" text-anchor="middle">{date} - {time}</text>
<text x="400" y="220" font-family="Arial" font-size="28" text-anchor="middle" font-weight="bold">ADMIT ONE</text>
<text x="400" y="260" font-family="Arial" font-size="18" text-anchor="middle">Ticket #{ticket_id}</text>
<rect x="300" y="300" width="200" height="100" fill="#000"/>
<rect x="310" y="310" width="180" height="80" fill="#fff"/>
<text x="400" y="360" font-family="Arial" font-size="16" text-anchor="middle" fill="#555">SCAN AT EVENT</text>
"##,
        pattern = PATTERNS[palette.pattern],
        background = background,
        accent = accent,
        name = name,
        date = format_date(input.start_time),
        time = format_time(input.start_time),
        ticket_id = input.ticket_id,
    );
    let (transform, fill, label) = if input.is_used {
        ("translate(400, 450) rotate(-30)", "red", "USED")
    } else {
        ("translate(400, 450)", "green", "VALID")
    };
    let _ = write!(
        svg,
        r#"<g transform="{}"><rect x="-150" y="-30" width="300" height="60" fill="{}" opacity="0.7" rx="10" ry="10"/><text x="0" y="5" font-family="Arial" font-size="36" text-anchor="middle" fill="white" font-weight="bold">{}</text></g>
<text x="400" y="520" font-family="Arial" font-size="14" text-anchor="middle">{}</text>
</svg>"#,
        transform, fill, label, FOOTER
    );
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::sample_events;

    const START: u64 = 1_767_225_600; // 2026-01-01 00:00 UTC

    fn decode_svg(uri: &str) -> String {
        let encoded = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
        String::from_utf8(base64::decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn test_metadata_fields() {
        let input = PreviewInput::new(2, 17, "NFT Art Exhibition", START, false).soulbound(true);
        let metadata = generate_ticket_metadata(&input);
        assert_eq!(metadata.name, "NFT Art Exhibition Ticket #17");
        assert_eq!(
            metadata.description,
            "Access pass for NFT Art Exhibition. Valid on 2026-01-01"
        );
        let attrs: Vec<(&str, &str)> = metadata
            .attributes
            .iter()
            .map(|a| (a.trait_type.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(attrs, vec![
            ("Event", "NFT Art Exhibition"),
            ("Ticket ID", "#17"),
            ("Date", "2026-01-01"),
            ("Status", "Valid"),
            ("Transferable", "No"),
        ]);
        assert_eq!(metadata.background_color.len(), 6);
        assert!(metadata.external_url.is_none());
    }

    #[test]
    fn test_deterministic() {
        let input = PreviewInput::new(3, 4521, "Web3 Music Festival", START, true);
        let first = serde_json::to_vec(&generate_ticket_metadata(&input)).unwrap();
        let second = serde_json::to_vec(&generate_ticket_metadata(&input)).unwrap();
        assert_eq!(first, second);

        let other = PreviewInput::new(3, 4522, "Web3 Music Festival", START, true);
        assert_ne!(
            generate_ticket_metadata(&input).image,
            generate_ticket_metadata(&other).image
        );
    }

    #[test]
    fn test_used_stamp() {
        let used = decode_svg(&generate_ticket_metadata(&PreviewInput::new(1, 1, "A", START, true)).image);
        assert!(used.contains(">USED<"));
        assert!(used.contains("rotate(-30)"));
        let valid = decode_svg(&generate_ticket_metadata(&PreviewInput::new(1, 1, "A", START, false)).image);
        assert!(valid.contains(">VALID<"));
    }

    #[test]
    fn test_non_ascii_and_markup_in_name() {
        let input = PreviewInput::new(1, 1, "Caf\u{e9} \u{6771}\u{4eac} <Live> & \u{1f389}", START, false);
        let svg = decode_svg(&ticket_image_uri(&input, ImageEncoding::Base64));
        assert!(svg.contains("Caf\u{e9} \u{6771}\u{4eac} &lt;Live&gt; &amp; \u{1f389}"));
        assert!(svg.contains(FOOTER));

        let utf8 = ticket_image_uri(&input, ImageEncoding::Utf8);
        assert!(utf8.starts_with("data:image/svg+xml;utf8,%3Csvg%20"));
        let (_, payload) = utf8.split_once(',').unwrap();
        assert!(payload.contains("%E6%9D%B1"));
        assert!(payload.contains("%26amp%3B"));
        assert!(!payload.contains('+'));
        assert!(payload.is_ascii());
    }

    #[test]
    fn test_long_name_is_cut_on_the_ticket_face_only() {
        let long_name = "x".repeat(60);
        let input = PreviewInput::new(1, 1, &long_name, START, false);
        let metadata = generate_ticket_metadata(&input);
        assert_eq!(metadata.attributes[0].value, long_name);
        let svg = decode_svg(&metadata.image);
        assert!(svg.contains(&format!(">{}<", "x".repeat(40))));
        assert!(!svg.contains(&"x".repeat(41)));
    }

    #[test]
    fn test_preview_for_resolved_ticket() {
        let mut event = sample_events(START).remove(1);
        event.is_soulbound = Some(true);
        let ticket = Ticket::from_chain(9, &event, false, "0x00000000000000000000000000000000000a11ce");
        let input = PreviewInput::for_ticket(&ticket, &event);
        assert_eq!(input.event_id, event.id);
        assert_eq!(input.ticket_id, 9);
        assert!(input.is_used);
        assert!(input.is_soulbound);
    }

    #[test]
    fn test_out_of_range_start_time_is_total() {
        let metadata = generate_ticket_metadata(&PreviewInput::new(u64::MAX, u64::MAX, "", u64::MAX, false));
        assert_eq!(metadata.attributes[2].value, "1970-01-01");
    }

    #[test]
    fn test_pastel_hex() {
        // hsl(0, 70%, 80%) = rgb(240, 168, 168)
        assert_eq!(pastel_hex(0), "f0a8a8");
        assert_eq!(pastel_hex(120), "a8f0a8");
    }

    #[test]
    fn test_external_url() {
        let input = PreviewInput::new(5, 1, "A", START, false).site_url("https://chainpass.app/");
        assert_eq!(
            generate_ticket_metadata(&input).external_url.as_deref(),
            Some("https://chainpass.app/events/5")
        );
    }
}
