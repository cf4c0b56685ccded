//! Market location geocoding: a static table of known benchmark markets,
//! with an external geocoder fallback memoized per (location, group).

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Known benchmark markets in the Addis Ababa area with approximate
/// coordinates. Checked before any external geocoder call.
pub static KNOWN_LOCATIONS: LazyLock<HashMap<&'static str, (f64, f64)>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // Local shops
    m.insert("benchmark location 5 Suk Lideta", (9.0175, 38.7464));
    m.insert("benchmark location 9 Sholla", (9.0272, 38.7361));
    m.insert("benchmark location 4 Suk Arada", (9.0308, 38.7500));
    m.insert("benchmark location 6 Suk Gulele", (9.0500, 38.7400));
    m.insert("benchmark location 8 Merkato", (9.0245, 38.7433));

    // Distribution centers
    m.insert("Distribution center 2 Garment", (9.0000, 38.7300));
    m.insert("Distribution center 3 02", (9.0100, 38.7400));
    m.insert("Distribution center 4 6Killo", (9.0150, 38.7600));
    m.insert("Distribution center 5 Ayat Yafo", (8.9500, 38.7800));

    // Supermarkets
    m.insert("benchmark location 3 supermarket FreshCorner", (9.0200, 38.7450));

    // Ecommerce pickup points
    m.insert("ZemenGebeya -YegnaGebeya", (9.0150, 38.7500));
    m.insert("ZemenGebeya -Ecomart", (9.0150, 38.7500));
    m.insert("AradaMart", (9.0300, 38.7500));

    // Farm locations
    m.insert("Oromia", (9.0000, 38.7000));

    m
});

#[derive(Debug, Deserialize)]
struct GeocoderHit {
    lat: String,
    lon: String,
}

/// Memoizing geocoder. Market names are a small closed set, so the cache is
/// unbounded; misses are memoized too so a dead geocoder is hit once per
/// location, not once per order row.
pub struct GeocodeCache {
    client: reqwest::Client,
    geocoder_url: String,
    cache: Mutex<HashMap<(String, String), Option<(f64, f64)>>>,
}

impl GeocodeCache {
    pub fn new(geocoder_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .user_agent("sgl-analytics/0.1")
                .build()
                .unwrap_or_default(),
            geocoder_url: geocoder_url.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a market name to (lat, lon): known-locations table first,
    /// then the external geocoder. Returns None when nothing resolves.
    pub async fn get_or_fetch(&self, location: &str, location_group: &str) -> Option<(f64, f64)> {
        let name = location.trim();
        if name.is_empty() {
            return None;
        }

        if let Some(coords) = KNOWN_LOCATIONS.get(name) {
            return Some(*coords);
        }
        // Some table entries carry the group as a suffix for disambiguation.
        let with_group = format!("{name} ({location_group})");
        if let Some(coords) = KNOWN_LOCATIONS.get(with_group.as_str()) {
            return Some(*coords);
        }

        let key = (name.to_string(), location_group.to_string());
        if let Some(cached) = self.cache.lock().await.get(&key) {
            return *cached;
        }

        // Fetched outside the lock; geocoding is idempotent, so a racing
        // duplicate fetch just overwrites with the same value.
        let resolved = self.fetch_remote(name).await;
        self.cache.lock().await.insert(key, resolved);
        resolved
    }

    async fn fetch_remote(&self, name: &str) -> Option<(f64, f64)> {
        let query = format!("{name}, Addis Ababa, Ethiopia");
        let request = self
            .client
            .get(&self.geocoder_url)
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")]);

        let hits: Vec<GeocoderHit> = match request.send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => match response.json().await {
                    Ok(hits) => hits,
                    Err(err) => {
                        warn!("geocoder returned unparseable payload for {name:?}: {err}");
                        return None;
                    }
                },
                Err(err) => {
                    warn!("geocoder rejected lookup for {name:?}: {err}");
                    return None;
                }
            },
            Err(err) => {
                warn!("geocoder unreachable for {name:?}: {err}");
                return None;
            }
        };

        let hit = hits.first()?;
        match (hit.lat.parse::<f64>(), hit.lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => {
                debug!("geocoded {name:?} to ({lat}, {lon})");
                Some((lat, lon))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_location_resolves_without_network() {
        // Unroutable geocoder URL: only the static table can answer.
        let cache = GeocodeCache::new("http://127.0.0.1:0");
        let coords = cache
            .get_or_fetch("benchmark location 8 Merkato", "local-shops")
            .await;
        assert_eq!(coords, Some((9.0245, 38.7433)));
    }

    #[tokio::test]
    async fn unknown_location_miss_is_memoized() {
        let cache = GeocodeCache::new("http://127.0.0.1:0");
        assert_eq!(cache.get_or_fetch("No Such Market", "local-shops").await, None);
        let memo = cache.cache.lock().await;
        assert!(memo.contains_key(&("No Such Market".to_string(), "local-shops".to_string())));
    }

    #[tokio::test]
    async fn empty_name_short_circuits() {
        let cache = GeocodeCache::new("http://127.0.0.1:0");
        assert_eq!(cache.get_or_fetch("   ", "farm").await, None);
        assert!(cache.cache.lock().await.is_empty());
    }
}
