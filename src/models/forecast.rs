use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::TimeSeriesForecaster;
use crate::dataset::DailyCount;
use crate::error::{Result, RuncastError};

/// History span (days) from which weekly seasonality is modelled.
const WEEKLY_SEASONALITY_MIN_SPAN: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Linear trend plus additive day-of-week effects fitted by least squares.
///
/// Uncertainty bounds are symmetric: the residual standard deviation scaled
/// by the normal quantile matching `interval_width`. Predictions and lower
/// bounds are clamped at zero since they are run counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendForecaster {
    interval_width: f64,
    fitted: Option<FittedTrend>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedTrend {
    origin: NaiveDate,
    last_date: NaiveDate,
    intercept: f64,
    slope: f64,
    /// Monday-first offsets; `None` for short histories
    weekly: Option<[f64; 7]>,
    residual_std: f64,
}

impl FittedTrend {
    fn day_index(&self, date: NaiveDate) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let days = (date - self.origin).num_days() as f64;
        days
    }

    fn predict(&self, date: NaiveDate) -> f64 {
        let seasonal = self
            .weekly
            .map_or(0.0, |weekly| weekly[weekday_index(date)]);
        self.intercept + self.slope * self.day_index(date) + seasonal
    }
}

fn weekday_index(date: NaiveDate) -> usize {
    date.weekday().num_days_from_monday() as usize
}

impl TrendForecaster {
    pub fn new(interval_width: f64) -> Self {
        Self {
            interval_width,
            fitted: None,
        }
    }

    pub fn interval_width(&self) -> f64 {
        self.interval_width
    }

    pub fn last_observed(&self) -> Option<NaiveDate> {
        self.fitted.as_ref().map(|fit| fit.last_date)
    }
}

impl TimeSeriesForecaster for TrendForecaster {
    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, series: &[DailyCount]) -> Result<()> {
        let mut points = series.to_vec();
        points.sort_by_key(|point| point.date);

        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Err(RuncastError::InsufficientData(
                "no daily counts to fit a forecast on".to_string(),
            ));
        };

        let origin = first.date;
        let last_date = last.date;
        let t: Vec<f64> = points
            .iter()
            .map(|p| (p.date - origin).num_days() as f64)
            .collect();
        let y: Vec<f64> = points.iter().map(|p| p.count as f64).collect();
        let n = y.len() as f64;

        let t_mean = t.iter().sum::<f64>() / n;
        let y_mean = y.iter().sum::<f64>() / n;
        let sxx: f64 = t.iter().map(|ti| (ti - t_mean).powi(2)).sum();
        let sxy: f64 = t
            .iter()
            .zip(&y)
            .map(|(ti, yi)| (ti - t_mean) * (yi - y_mean))
            .sum();

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = y_mean - slope * t_mean;

        let weekly = if (last_date - origin).num_days() >= WEEKLY_SEASONALITY_MIN_SPAN {
            Some(weekly_offsets(&points, &t, &y, intercept, slope))
        } else {
            None
        };

        let mut fitted = FittedTrend {
            origin,
            last_date,
            intercept,
            slope,
            weekly,
            residual_std: 0.0,
        };

        let sse: f64 = points
            .iter()
            .zip(&y)
            .map(|(p, yi)| (yi - fitted.predict(p.date)).powi(2))
            .sum();
        fitted.residual_std = (sse / n).sqrt();

        log::debug!(
            "Fitted trend forecaster: slope {:.4}/day, weekly seasonality {}, residual std {:.3}",
            fitted.slope,
            fitted.weekly.is_some(),
            fitted.residual_std
        );

        self.fitted = Some(fitted);
        Ok(())
    }

    fn forecast(&self, horizon_days: u32) -> Result<Vec<ForecastPoint>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| RuncastError::Model("forecaster has not been fitted".to_string()))?;

        let z = normal_quantile(0.5 + self.interval_width.clamp(0.0, 0.999_999) / 2.0);
        let margin = z * fitted.residual_std;

        (1..=i64::from(horizon_days))
            .map(|offset| {
                let date = fitted
                    .last_date
                    .checked_add_signed(Duration::days(offset))
                    .ok_or_else(|| {
                        RuncastError::Model(format!(
                            "forecast date {offset} days after {} is out of range",
                            fitted.last_date
                        ))
                    })?;
                let yhat = fitted.predict(date);
                Ok(ForecastPoint {
                    date,
                    predicted: yhat.max(0.0),
                    lower: (yhat - margin).max(0.0),
                    upper: (yhat + margin).max(0.0),
                })
            })
            .collect()
    }
}

/// Mean detrended residual per weekday, centered over the weekdays that
/// were observed. Unobserved weekdays get no offset.
#[allow(clippy::cast_precision_loss)]
fn weekly_offsets(points: &[DailyCount], t: &[f64], y: &[f64], intercept: f64, slope: f64) -> [f64; 7] {
    let mut sums = [0.0; 7];
    let mut counts = [0usize; 7];

    for ((point, ti), yi) in points.iter().zip(t).zip(y) {
        let idx = weekday_index(point.date);
        sums[idx] += yi - (intercept + slope * ti);
        counts[idx] += 1;
    }

    let mut offsets = [0.0; 7];
    for idx in 0..7 {
        if counts[idx] > 0 {
            offsets[idx] = sums[idx] / counts[idx] as f64;
        }
    }

    let observed = counts.iter().filter(|&&c| c > 0).count();
    if observed > 0 {
        let center = offsets.iter().sum::<f64>() / observed as f64;
        for idx in 0..7 {
            if counts[idx] > 0 {
                offsets[idx] -= center;
            }
        }
    }

    offsets
}

/// Inverse of the standard normal CDF (Acklam's rational approximation,
/// relative error below 1.2e-9).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}
