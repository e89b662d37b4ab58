//! QR payload construction and rendering.
//!
//! The payload is a URL phones can open directly:
//!
//! ```text
//! https://mangochain.verify/MANGO2024-001?farm=Green+Valley+Farm&farmer=...&product=...
//!     &location=...&harvest=<date>&step=<n>&blocks=<len>&hash=<token prefix>&time=<epoch ms>
//! ```
//!
//! It is never stored; callers rebuild it from the live ledger each time.

use std::fmt;

use qrcode::{render::svg, EcLevel, QrCode};
use serde::Serialize;
use url::form_urlencoded;

use crate::error::Result;

/// Characters of the latest integrity token carried in the payload.
pub const HASH_PREFIX_LEN: usize = 16;

const QR_MIN_SIZE: u32 = 200;
const QR_DARK: &str = "#2c3e50";
const QR_LIGHT: &str = "#ffffff";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QrPayload {
    pub scheme: String,
    pub domain: String,
    pub batch_id: String,
    pub farm: String,
    pub farmer: String,
    pub product: String,
    pub location: String,
    pub harvest: String,
    pub step: u8,
    pub blocks: usize,
    pub hash: String,
    pub time_ms: i128,
}

impl QrPayload {
    /// Truncate a block token to the prefix carried in the payload.
    pub fn hash_prefix(token: &str) -> String {
        token.chars().take(HASH_PREFIX_LEN).collect()
    }
}

impl fmt::Display for QrPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("farm", &self.farm)
            .append_pair("farmer", &self.farmer)
            .append_pair("product", &self.product)
            .append_pair("location", &self.location)
            .append_pair("harvest", &self.harvest)
            .append_pair("step", &self.step.to_string())
            .append_pair("blocks", &self.blocks.to_string())
            .append_pair("hash", &self.hash)
            .append_pair("time", &self.time_ms.to_string())
            .finish();
        write!(
            f,
            "{}://{}/{}?{}",
            self.scheme, self.domain, self.batch_id, query
        )
    }
}

/// Render `data` as an SVG QR code with high error correction.
pub fn render_svg(data: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .dark_color(svg::Color(QR_DARK))
        .light_color(svg::Color(QR_LIGHT))
        .build();
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QrPayload {
        QrPayload {
            scheme: "https".into(),
            domain: "mangochain.verify".into(),
            batch_id: "MANGO2024-001".into(),
            farm: "Green Valley Farm".into(),
            farmer: "Rajesh Kumar".into(),
            product: "Alphonso Mango".into(),
            location: "Ratnagiri, Maharashtra".into(),
            harvest: "18 October 2026".into(),
            step: 3,
            blocks: 4,
            hash: QrPayload::hash_prefix("0x0123456789abcdef0123456789abcdef"),
            time_ms: 1_792_000_000_000,
        }
    }

    #[test]
    fn payload_is_url_with_encoded_fields() {
        assert_eq!(
            sample().to_string(),
            "https://mangochain.verify/MANGO2024-001?farm=Green+Valley+Farm\
             &farmer=Rajesh+Kumar&product=Alphonso+Mango\
             &location=Ratnagiri%2C+Maharashtra&harvest=18+October+2026\
             &step=3&blocks=4&hash=0x0123456789abcd&time=1792000000000"
        );
    }

    #[test]
    fn hash_prefix_keeps_sixteen_chars() {
        assert_eq!(QrPayload::hash_prefix("0xabc"), "0xabc");
        assert_eq!(
            QrPayload::hash_prefix("0x0123456789abcdef0123").len(),
            HASH_PREFIX_LEN
        );
    }

    #[test]
    fn renders_svg_document() {
        let svg = render_svg(&sample().to_string()).expect("svg");
        assert!(svg.contains("<svg"));
        assert!(svg.contains(QR_DARK));
    }

    #[test]
    fn oversized_payload_fails_to_render() {
        let data = "m".repeat(4000);
        assert!(render_svg(&data).is_err());
    }
}
