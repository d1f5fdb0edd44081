//! Deterministic-shaped placeholder forecast for development builds.

use rand::Rng;

use crate::core::model::{ForecastPoint, ForecastResult};

/// Builds `points` samples spaced `spacing_secs` apart from `starts_at`,
/// with `power = 50 + 100·u + 20·sin(0.5·i)` for uniform `u` in `[0, 1)`.
///
/// The series stops early once a timestamp would overflow `i64`.
pub fn synthesize_forecast<R: Rng + ?Sized>(
    starts_at: i64,
    points: usize,
    spacing_secs: i64,
    rng: &mut R,
) -> ForecastResult {
    let forecast = (0..points)
        .map_while(|i| {
            let offset = i64::try_from(i).ok()?.checked_mul(spacing_secs)?;
            let timestamp = starts_at.checked_add(offset)?;
            let u: f64 = rng.random();
            Some(ForecastPoint {
                timestamp,
                power: 50.0 + 100.0 * u + 20.0 * (0.5 * i as f64).sin(),
            })
        })
        .collect();

    ForecastResult { forecast }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn twelve_points_five_minutes_apart() {
        let mut rng = StdRng::seed_from_u64(5);
        let result = synthesize_forecast(1_700_000_000, 12, 300, &mut rng);

        assert_eq!(result.forecast.len(), 12);
        assert_eq!(result.forecast[0].timestamp, 1_700_000_000);
        for pair in result.forecast.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, 300);
        }
        for (i, point) in result.forecast.iter().enumerate() {
            let wave = 20.0 * (0.5 * i as f64).sin();
            let noise = point.power - 50.0 - wave;
            assert!((0.0..100.0).contains(&noise), "point {} noise {}", i, noise);
        }
    }

    #[test]
    fn series_is_cut_short_instead_of_overflowing() {
        let mut rng = StdRng::seed_from_u64(5);
        let result = synthesize_forecast(i64::MAX - 10, 12, 300, &mut rng);
        assert_eq!(result.forecast.len(), 1);
        assert_eq!(result.forecast[0].timestamp, i64::MAX - 10);

        let result = synthesize_forecast(i64::MAX - 700, 12, 300, &mut rng);
        let stamps: Vec<i64> = result.forecast.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![i64::MAX - 700, i64::MAX - 400, i64::MAX - 100]);
    }
}
