//! Reference price selection and series plumbing: haversine distance,
//! nearest-point price selection, series accumulation and merging.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{
    BenchmarkPricePoint, Channel, PriceResolution, PriceSeries, PriceSeriesEntry, PriceSource,
};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lon) coordinates in kilometers.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = a;
    let (lat2, lon2) = b;
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();
    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Pick the reference price a leader should be compared against for one
/// channel of a price entry: the nearest benchmark point when the leader's
/// coordinate is known and the channel has located points, otherwise the
/// channel average, otherwise nothing.
pub fn select_price(
    entry: Option<&PriceSeriesEntry>,
    channel: Channel,
    leader_coord: Option<(f64, f64)>,
) -> PriceResolution {
    let Some(entry) = entry else {
        return PriceResolution::Missing;
    };
    let prices = entry.channel(channel);

    if let Some(coord) = leader_coord {
        let nearest = prices
            .points
            .iter()
            .map(|point| (haversine_km(coord, (point.lat, point.lon)), point))
            .min_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((distance_km, point)) = nearest {
            return PriceResolution::Nearest {
                price: point.price,
                distance_km,
                location: point.location.clone(),
                location_group: point.location_group.clone(),
            };
        }
    }

    match prices.avg {
        Some(price) => PriceResolution::Averaged { price },
        None => PriceResolution::Missing,
    }
}

/// Merge the benchmark-API series (base) with the ledger-derived series:
/// averages already present in the base win, points are concatenated and
/// provenance sets are unioned.
pub fn merge_price_series(base: PriceSeries, fallback: PriceSeries) -> PriceSeries {
    let mut merged = base;
    for (key, incoming) in fallback {
        let existing = merged.entry(key).or_default();
        for channel in [Channel::Local, Channel::Distribution, Channel::Sunday] {
            let slot = existing.channel_mut(channel);
            let incoming_channel = incoming.channel(channel);
            if slot.avg.is_none() {
                slot.avg = incoming_channel.avg;
            }
            slot.points.extend(incoming_channel.points.iter().cloned());
        }
        existing.sources.extend(incoming.sources.iter().copied());
    }
    merged
}

/// One raw sample on its way into a series; coordinates may be unresolved.
pub(crate) struct RawSample {
    pub price: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub location: String,
    pub location_group: String,
}

#[derive(Default)]
struct ChannelBuilder {
    prices: Vec<f64>,
    samples: Vec<RawSample>,
}

#[derive(Default)]
struct EntryBuilder {
    local: ChannelBuilder,
    distribution: ChannelBuilder,
    sunday: ChannelBuilder,
    sources: std::collections::HashSet<PriceSource>,
}

impl EntryBuilder {
    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelBuilder {
        match channel {
            Channel::Local => &mut self.local,
            Channel::Distribution => &mut self.distribution,
            Channel::Sunday => &mut self.sunday,
        }
    }
}

/// Accumulates raw samples into a `PriceSeries`. Averages are the mean of
/// every sample seen; only samples with resolved coordinates survive as
/// nearest-neighbor candidate points.
#[derive(Default)]
pub(crate) struct SeriesBuilder {
    entries: HashMap<(String, NaiveDate), EntryBuilder>,
}

impl SeriesBuilder {
    pub fn add_sample(
        &mut self,
        product: &str,
        day: NaiveDate,
        channel: Channel,
        sample: RawSample,
        source: PriceSource,
    ) {
        let entry = self.entries.entry((product.to_string(), day)).or_default();
        entry.sources.insert(source);
        let slot = entry.channel_mut(channel);
        slot.prices.push(sample.price);
        slot.samples.push(sample);
    }

    pub fn finish(self) -> PriceSeries {
        self.entries
            .into_iter()
            .map(|(key, builder)| {
                let mut entry = PriceSeriesEntry {
                    sources: builder.sources,
                    ..Default::default()
                };
                for (channel, built) in [
                    (Channel::Local, builder.local),
                    (Channel::Distribution, builder.distribution),
                    (Channel::Sunday, builder.sunday),
                ] {
                    let slot = entry.channel_mut(channel);
                    if !built.prices.is_empty() {
                        slot.avg =
                            Some(built.prices.iter().sum::<f64>() / built.prices.len() as f64);
                    }
                    slot.points = built
                        .samples
                        .into_iter()
                        .filter_map(|sample| {
                            let (lat, lon) = (sample.lat?, sample.lon?);
                            Some(BenchmarkPricePoint {
                                price: sample.price,
                                lat,
                                lon,
                                location: sample.location,
                                location_group: sample.location_group,
                            })
                        })
                        .collect();
                }
                (key, entry)
            })
            .collect()
    }
}
