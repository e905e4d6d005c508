use std::sync::OnceLock;

use regex::Regex;

use crate::types::{Carrier, DeviceInfo, ShippingInfo};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Digit runs are bounded by non-digits rather than `\b`, so "IMEI:356938035643809"
// matches but a 16-digit run never yields its first 15 digits.
re!(re_imei,
    r"(?:^|[^0-9])([0-9]{15})(?:[^0-9]|$)");
re!(re_model,
    r"(?i)\b(iphone|ipad|ipod|apple\s+watch|macbook|imac)\s*([0-9]{1,2})(?:\s*(pro|max|plus|mini))?\b");
re!(re_storage,
    r"(?i)\b(64|128|256|512|1024|1|2)(gb|tb)\b");

re!(re_ups,
    r"(?i)\b1Z[A-Z0-9]{16}\b");
re!(re_usps,
    r"\b(?:92|93|94|95)[0-9]{20,22}\b");
re!(re_fedex,
    r"\b[0-9]{12,15}\b");

/// Canonical spellings, multi-word finishes first.
const COLORS: &[&str] = &[
    "Space Gray",
    "Space Grey",
    "Space Black",
    "Rose Gold",
    "Sierra Blue",
    "Alpine Green",
    "Jet Black",
    "Silver",
    "Gold",
    "Black",
    "White",
    "Blue",
    "Green",
    "Red",
    "Purple",
    "Graphite",
    "Midnight",
    "Starlight",
    "Pink",
    "Yellow",
];

const FAMILIES: &[&str] = &["iPhone", "iPad", "iPod", "Apple Watch", "MacBook", "iMac"];
const TIERS: &[&str] = &["Pro", "Max", "Plus", "Mini"];

fn re_color() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        let alternatives = COLORS
            .iter()
            .map(|c| c.replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)\b({alternatives})\b")).expect("invalid regex")
    })
}

/// Carrier formats in the order they are tried. The plain numeric FedEx
/// format would also match parts of the other two, so it must stay last.
fn tracking_rules() -> [(Carrier, &'static Regex); 3] {
    [
        (Carrier::Ups, re_ups()),
        (Carrier::Usps, re_usps()),
        (Carrier::Fedex, re_fedex()),
    ]
}

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// Extract device and shipping fields from raw OCR text. Every field is
    /// looked up independently; missing fields are simply `None`.
    pub fn extract(ocr_text: &str) -> (DeviceInfo, ShippingInfo) {
        (Self::device(ocr_text), Self::shipping(ocr_text))
    }

    pub fn device(ocr_text: &str) -> DeviceInfo {
        DeviceInfo {
            imei: extract_imei(ocr_text),
            model: extract_model(ocr_text),
            storage: extract_storage(ocr_text),
            color: extract_color(ocr_text),
        }
    }

    pub fn shipping(ocr_text: &str) -> ShippingInfo {
        match extract_tracking(ocr_text) {
            Some((number, carrier)) => ShippingInfo {
                tracking_number: Some(number),
                carrier: Some(carrier),
            },
            None => ShippingInfo::default(),
        }
    }
}

/// First run of exactly 15 digits.
pub fn extract_imei(text: &str) -> Option<String> {
    let c = re_imei().captures(text)?;
    Some(c.get(1)?.as_str().to_string())
}

/// First `<family> <number>[ <tier>]`, e.g. "IPHONE 13pro" → "iPhone 13 Pro".
pub fn extract_model(text: &str) -> Option<String> {
    let c = re_model().captures(text)?;
    let family = canonical(FAMILIES, c.get(1)?.as_str())?;
    let number = c.get(2)?.as_str();
    match c.get(3) {
        Some(tier) => Some(format!("{family} {number} {}", canonical(TIERS, tier.as_str())?)),
        None => Some(format!("{family} {number}")),
    }
}

/// First capacity such as "128GB" or "1TB", unit upper-cased.
pub fn extract_storage(text: &str) -> Option<String> {
    let c = re_storage().captures(text)?;
    Some(format!("{}{}", c.get(1)?.as_str(), c.get(2)?.as_str().to_uppercase()))
}

/// First named color, in its canonical spelling.
pub fn extract_color(text: &str) -> Option<String> {
    let m = re_color().find(text)?;
    canonical(COLORS, m.as_str()).map(str::to_string)
}

/// Tracking number and the carrier whose format it matched.
pub fn extract_tracking(text: &str) -> Option<(String, Carrier)> {
    tracking_rules().into_iter().find_map(|(carrier, re)| {
        re.find(text).map(|m| (m.as_str().to_uppercase(), carrier))
    })
}

/// Vocabulary entry equal to `found` ignoring case and internal whitespace.
fn canonical(vocabulary: &[&'static str], found: &str) -> Option<&'static str> {
    let needle = collapse_whitespace(found).to_lowercase();
    vocabulary.iter().copied().find(|v| v.to_lowercase() == needle)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── IMEI ─────────────────────────────────────────────────────────────────

    #[test]
    fn imei_exact_fifteen_digits() {
        assert_eq!(extract_imei("IMEI: 356938035643809\nS/N X").as_deref(), Some("356938035643809"));
    }

    #[test]
    fn imei_bounded_by_letters() {
        assert_eq!(extract_imei("IMEI356938035643809SN").as_deref(), Some("356938035643809"));
    }

    #[test]
    fn imei_rejects_other_lengths() {
        assert_eq!(extract_imei("35693803564380"), None);
        assert_eq!(extract_imei("3569380356438091"), None);
        assert_eq!(extract_imei("no digits here"), None);
    }

    #[test]
    fn imei_first_of_two() {
        let text = "IMEI1 356938035643809 IMEI2 356938035643817";
        assert_eq!(extract_imei(text).as_deref(), Some("356938035643809"));
    }

    // ── Model ────────────────────────────────────────────────────────────────

    #[test]
    fn model_with_tier() {
        assert_eq!(extract_model("iPhone 13 Pro 128GB Space Gray").as_deref(), Some("iPhone 13 Pro"));
    }

    #[test]
    fn model_is_normalized() {
        assert_eq!(extract_model("APPLE IPHONE 12MINI").as_deref(), Some("iPhone 12 Mini"));
        assert_eq!(extract_model("apple   watch 7").as_deref(), Some("Apple Watch 7"));
        assert_eq!(extract_model("ipad 9 wi-fi").as_deref(), Some("iPad 9"));
    }

    #[test]
    fn model_without_tier() {
        assert_eq!(extract_model("Model: iPhone 11, Black").as_deref(), Some("iPhone 11"));
    }

    #[test]
    fn model_does_not_take_capacity_digits() {
        assert_eq!(extract_model("iPhone 128GB"), None);
        assert_eq!(extract_model("iPhone 13 128GB").as_deref(), Some("iPhone 13"));
    }

    #[test]
    fn model_tier_must_be_whole_word() {
        assert_eq!(extract_model("iPhone 14 Promo").as_deref(), Some("iPhone 14"));
    }

    #[test]
    fn model_requires_number() {
        assert_eq!(extract_model("MacBook Air"), None);
    }

    // ── Storage ──────────────────────────────────────────────────────────────

    #[test]
    fn storage_canonical_values() {
        assert_eq!(extract_storage("iPhone 13 Pro 128GB").as_deref(), Some("128GB"));
        assert_eq!(extract_storage("capacity 1tb").as_deref(), Some("1TB"));
        assert_eq!(extract_storage("1024GB").as_deref(), Some("1024GB"));
    }

    #[test]
    fn storage_rejects_other_capacities() {
        assert_eq!(extract_storage("32GB"), None);
        assert_eq!(extract_storage("12GB"), None);
        assert_eq!(extract_storage("128 GB"), None);
    }

    // ── Color ────────────────────────────────────────────────────────────────

    #[test]
    fn color_multi_word() {
        assert_eq!(extract_color("iPhone 13 Pro 128GB Space Gray").as_deref(), Some("Space Gray"));
        assert_eq!(extract_color("ROSE   GOLD").as_deref(), Some("Rose Gold"));
    }

    #[test]
    fn color_whole_word_only() {
        assert_eq!(extract_color("Redmond, WA"), None);
        assert_eq!(extract_color("Goldfish"), None);
        assert_eq!(extract_color("color: red").as_deref(), Some("Red"));
    }

    // ── Tracking ─────────────────────────────────────────────────────────────

    #[test]
    fn tracking_ups() {
        let (n, c) = extract_tracking("TRACKING #: 1Z999AA10123456784").unwrap();
        assert_eq!(n, "1Z999AA10123456784");
        assert_eq!(c, Carrier::Ups);
    }

    #[test]
    fn tracking_ups_wins_over_plain_digits() {
        let text = "REF 123456789012\nTRK 1Z999AA10123456784";
        assert_eq!(extract_tracking(text), Some(("1Z999AA10123456784".to_string(), Carrier::Ups)));
    }

    #[test]
    fn tracking_ups_lowercase_is_normalized() {
        let (n, _) = extract_tracking("1z999aa10123456784").unwrap();
        assert_eq!(n, "1Z999AA10123456784");
    }

    #[test]
    fn tracking_usps() {
        let (n, c) = extract_tracking("USPS TRACKING # 9400111899223197428490").unwrap();
        assert_eq!(n, "9400111899223197428490");
        assert_eq!(c, Carrier::Usps);
    }

    #[test]
    fn tracking_usps_wins_over_fedex_even_when_later() {
        let text = "Order 123456789012 ships via 9205590164917312751089";
        assert_eq!(extract_tracking(text).unwrap().1, Carrier::Usps);
    }

    #[test]
    fn tracking_fedex_plain_digits() {
        let (n, c) = extract_tracking("FedEx 794644790138").unwrap();
        assert_eq!(n, "794644790138");
        assert_eq!(c, Carrier::Fedex);
    }

    #[test]
    fn tracking_none() {
        assert_eq!(extract_tracking("iPhone 13 Pro 128GB"), None);
        assert_eq!(extract_tracking("12345678901"), None);
    }

    // ── Composition ──────────────────────────────────────────────────────────

    #[test]
    fn device_fields_independent_of_order() {
        let d = Extractor::device("Space Gray 128GB iPhone 13 Pro");
        assert_eq!(d.model.as_deref(), Some("iPhone 13 Pro"));
        assert_eq!(d.storage.as_deref(), Some("128GB"));
        assert_eq!(d.color.as_deref(), Some("Space Gray"));
        assert_eq!(d.imei, None);
    }

    #[test]
    fn imei_and_fedex_are_independent() {
        let (device, shipping) = Extractor::extract("IMEI 356938035643809");
        assert_eq!(device.imei.as_deref(), Some("356938035643809"));
        assert_eq!(shipping.carrier, Some(Carrier::Fedex));
    }

    #[test]
    fn empty_text_yields_nothing() {
        let (device, shipping) = Extractor::extract("");
        assert!(device.is_empty());
        assert!(shipping.is_empty());
        assert_eq!(shipping.carrier, None);
    }

    #[test]
    fn no_panic_on_garbage_input() {
        let _ = Extractor::extract("!@#$%^&*()\n\0\x01\x02 ü 中文");
    }
}
