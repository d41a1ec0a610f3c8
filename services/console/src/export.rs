//! Printable guest documents.
//!
//! Cards and listings are rendered as standalone SVG so they can be printed
//! or rasterized at any size.

use crate::client::GuestView;
use crate::error::ConsoleResult;
use crate::photo::LoadedPhoto;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

const SVG_MIME: &str = "image/svg+xml";

const CARD_WIDTH: u32 = 350;
const CARD_HEIGHT: u32 = 200;
const PHOTO_CX: u32 = 70;
const PHOTO_CY: u32 = 100;
const PHOTO_RADIUS: u32 = 45;

const LISTING_WIDTH: u32 = 800;
const LISTING_ROW_HEIGHT: u32 = 28;
const LISTING_TOP: u32 = 90;
/// Column x offsets for No., Name, Address, Email, Phone
const LISTING_COLUMNS: [(u32, &str); 5] = [
    (30, "No."),
    (80, "Name"),
    (240, "Address"),
    (450, "Email"),
    (650, "Phone"),
];

/// A rendered document with a suggested download name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDocument {
    pub file_name: String,
    pub mime: &'static str,
    pub body: String,
}

impl ExportedDocument {
    /// Write the document to `path`
    pub async fn write_to(&self, path: impl AsRef<Path>) -> ConsoleResult<()> {
        let path = path.as_ref();
        tokio::fs::write(path, self.body.as_bytes()).await?;
        info!(path = %path.display(), size_bytes = self.body.len(), "Document exported");
        Ok(())
    }
}

/// Business card for one guest. Without a photo the card shows the
/// guest's initials in the photo circle.
pub fn business_card(guest: &GuestView, photo: Option<&LoadedPhoto>) -> ExportedDocument {
    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{CARD_WIDTH}" height="{CARD_HEIGHT}" viewBox="0 0 {CARD_WIDTH} {CARD_HEIGHT}">"#
    );
    let _ = write!(
        svg,
        r#"<defs><clipPath id="photo-clip"><circle cx="{PHOTO_CX}" cy="{PHOTO_CY}" r="{PHOTO_RADIUS}"/></clipPath></defs>"#
    );
    let _ = write!(
        svg,
        r##"<rect x="0.5" y="0.5" width="{}" height="{}" rx="12" fill="#ffffff" stroke="#d0d5dd"/>"##,
        CARD_WIDTH - 1,
        CARD_HEIGHT - 1
    );

    match photo {
        Some(photo) => {
            let _ = write!(
                svg,
                r#"<image href="{}" x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="xMidYMid slice" clip-path="url(#photo-clip)"/>"#,
                photo.data_uri(),
                PHOTO_CX - PHOTO_RADIUS,
                PHOTO_CY - PHOTO_RADIUS,
                PHOTO_RADIUS * 2,
                PHOTO_RADIUS * 2
            );
        }
        None => {
            let _ = write!(
                svg,
                r##"<circle cx="{PHOTO_CX}" cy="{PHOTO_CY}" r="{PHOTO_RADIUS}" fill="#e4e7ec"/><text x="{PHOTO_CX}" y="{}" text-anchor="middle" font-family="sans-serif" font-size="28" fill="#475467">{}</text>"##,
                PHOTO_CY + 10,
                escape(&initials(&guest.name))
            );
        }
    }

    let mut y = 55;
    let _ = write!(
        svg,
        r##"<text x="135" y="{y}" font-family="sans-serif" font-size="18" font-weight="bold" fill="#101828">{}</text>"##,
        escape(&guest.name)
    );
    y += 20;

    if let Some(role) = present(&guest.role) {
        let _ = write!(
            svg,
            r##"<text x="135" y="{y}" font-family="sans-serif" font-size="12" fill="#6941c6">{}</text>"##,
            escape(role)
        );
        y += 22;
    } else {
        y += 8;
    }

    let details = [Some(guest.email.as_str()), present(&guest.phone), present(&guest.address)];
    for line in details.into_iter().flatten() {
        let _ = write!(
            svg,
            r##"<text x="135" y="{y}" font-family="sans-serif" font-size="11" fill="#344054">{}</text>"##,
            escape(line)
        );
        y += 18;
    }

    svg.push_str("</svg>");

    ExportedDocument {
        file_name: format!("card-{}.svg", slug(&guest.name)),
        mime: SVG_MIME,
        body: svg,
    }
}

/// Table of all guests, one row each
pub fn guest_listing(guests: &[GuestView]) -> ExportedDocument {
    let rows = u32::try_from(guests.len()).unwrap_or(u32::MAX);
    let height = LISTING_TOP
        .saturating_add(LISTING_ROW_HEIGHT.saturating_mul(rows))
        .saturating_add(30);

    let mut svg = String::new();
    let _ = write!(
        svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{LISTING_WIDTH}" height="{height}" viewBox="0 0 {LISTING_WIDTH} {height}"><rect width="100%" height="100%" fill="#ffffff"/>"##
    );
    let _ = write!(
        svg,
        r##"<text x="30" y="40" font-family="sans-serif" font-size="22" font-weight="bold" fill="#101828">Guest List</text>"##
    );

    let header_y = LISTING_TOP - 12;
    let _ = write!(
        svg,
        r##"<rect x="20" y="{}" width="{}" height="{LISTING_ROW_HEIGHT}" fill="#f2f4f7"/>"##,
        header_y - 18,
        LISTING_WIDTH - 40
    );
    for (x, title) in LISTING_COLUMNS {
        let _ = write!(
            svg,
            r##"<text x="{x}" y="{header_y}" font-family="sans-serif" font-size="12" font-weight="bold" fill="#344054">{title}</text>"##
        );
    }

    for (index, guest) in guests.iter().enumerate() {
        let y = header_y + LISTING_ROW_HEIGHT * (index as u32 + 1);
        let number = (index + 1).to_string();
        let cells = [
            number.as_str(),
            guest.name.as_str(),
            present(&guest.address).unwrap_or(""),
            guest.email.as_str(),
            present(&guest.phone).unwrap_or("—"),
        ];

        for ((x, _), value) in LISTING_COLUMNS.iter().zip(cells) {
            let _ = write!(
                svg,
                r##"<text x="{x}" y="{y}" font-family="sans-serif" font-size="12" fill="#101828">{}</text>"##,
                escape(value)
            );
        }
    }

    svg.push_str("</svg>");

    ExportedDocument {
        file_name: "guests.svg".to_string(),
        mime: SVG_MIME,
        body: svg,
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Escape text for XML content and attribute values
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn initials(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect();

    if initials.is_empty() {
        "?".to_string()
    } else {
        initials
    }
}

/// Lowercase ASCII words joined by dashes
fn slug(name: &str) -> String {
    let slug = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        "guest".to_string()
    } else {
        slug
    }
}
