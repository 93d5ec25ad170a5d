//! Static asset metadata
//!
//! The default watch list, display names for coins whose upstream id differs
//! from their common name, and the upstream image-repository ids needed to
//! build logo URLs without an API call.

/// Coins shown on the dashboard by default.
pub const WATCHED_IDS: [&str; 6] = [
    "bitcoin",
    "ethereum",
    "solana",
    "the-open-network",
    "tether",
    "ripple",
];

/// Display name and ticker for a known asset id.
struct DisplayInfo {
    id: &'static str,
    name: &'static str,
    symbol: &'static str,
}

const DISPLAY_INFO: [DisplayInfo; 6] = [
    DisplayInfo { id: "bitcoin", name: "Bitcoin", symbol: "BTC" },
    DisplayInfo { id: "ethereum", name: "Ethereum", symbol: "ETH" },
    DisplayInfo { id: "solana", name: "Solana", symbol: "SOL" },
    DisplayInfo { id: "the-open-network", name: "Toncoin", symbol: "TON" },
    DisplayInfo { id: "tether", name: "Tether", symbol: "USDT" },
    DisplayInfo { id: "ripple", name: "XRP", symbol: "XRP" },
];

/// Returns the display name and ticker for `id`, if it is a known asset.
pub fn display_info(id: &str) -> Option<(&'static str, &'static str)> {
    DISPLAY_INFO
        .iter()
        .find(|info| info.id == id)
        .map(|info| (info.name, info.symbol))
}

/// Upstream image-repository ids for common coins.
///
/// Logo URLs follow a fixed pattern keyed by these ids, so fallback entries
/// can carry a real logo without asking the API.
const IMAGE_IDS: [(&str, u32); 10] = [
    ("bitcoin", 1),
    ("ethereum", 279),
    ("tether", 325),
    ("binancecoin", 825),
    ("ripple", 44),
    ("dogecoin", 5),
    ("cardano", 2010),
    ("solana", 4128),
    ("polkadot", 12171),
    ("the-open-network", 16638),
];

/// Builds the logo URL for `id`, defaulting to the Bitcoin image id when the
/// coin is not in the map.
pub fn image_url(id: &str) -> String {
    let image_id = IMAGE_IDS
        .iter()
        .find(|(coin, _)| *coin == id)
        .map(|(_, image_id)| *image_id)
        .unwrap_or(1);
    format!("https://assets.coingecko.com/coins/images/{image_id}/small/{id}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_info_for_known_id() {
        assert_eq!(display_info("the-open-network"), Some(("Toncoin", "TON")));
    }

    #[test]
    fn test_display_info_for_unknown_id() {
        assert!(display_info("notacoin").is_none());
    }

    #[test]
    fn test_image_url_for_known_coin() {
        assert_eq!(
            image_url("solana"),
            "https://assets.coingecko.com/coins/images/4128/small/solana.png"
        );
    }

    #[test]
    fn test_image_url_defaults_for_unknown_coin() {
        assert_eq!(
            image_url("notacoin"),
            "https://assets.coingecko.com/coins/images/1/small/notacoin.png"
        );
    }

    #[test]
    fn test_every_watched_id_has_display_info() {
        for id in WATCHED_IDS {
            assert!(display_info(id).is_some(), "Missing display info for {id}");
        }
    }
}
