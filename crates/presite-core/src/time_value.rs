use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::SolverSettings;
use crate::error::{overflow, PreSiteError};
use crate::types::{Money, Rate};
use crate::PreSiteResult;

const IRR_INITIAL_GUESS: Decimal = dec!(0.10);

/// Net Present Value of a series of cash flows. Period 0 is undiscounted.
///
/// Terms whose discount factor grows past the Decimal range contribute
/// nothing measurable and are dropped; a discount factor that collapses
/// towards zero (rates near -100%) is an error.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> PreSiteResult<Money> {
    if rate <= dec!(-1) {
        return Err(PreSiteError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE
        .checked_add(rate)
        .ok_or_else(|| overflow("NPV discount rate"))?;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            match discount.checked_mul(one_plus_r) {
                Some(d) => discount = d,
                None => break,
            }
        }
        let term = cf
            .checked_div(discount)
            .ok_or_else(|| PreSiteError::DivisionByZero {
                context: format!("NPV discount factor at period {t}"),
            })?;
        result = result
            .checked_add(term)
            .ok_or_else(|| overflow(format!("NPV accumulation at period {t}")))?;
    }

    Ok(result)
}

/// NPV and its derivative with respect to the rate.
fn npv_and_derivative(rate: Rate, cash_flows: &[Money]) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE.checked_add(rate)?;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }
    let mut npv = Decimal::ZERO;
    let mut dnpv = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(one_plus_r)?;
        }
        let term = cf.checked_div(discount)?;
        npv = npv.checked_add(term)?;
        if t > 0 {
            // d/dr of CF_t / (1+r)^t = -t * CF_t / (1+r)^(t+1)
            let d = Decimal::from(t as i64)
                .checked_mul(term)?
                .checked_div(one_plus_r)?;
            dnpv = dnpv.checked_sub(d)?;
        }
    }
    Some((npv, dnpv))
}

/// Largest absolute cash flow, used to normalise convergence checks.
pub(crate) fn flow_scale(cash_flows: &[Money]) -> Decimal {
    let scale = cash_flows
        .iter()
        .map(|cf| cf.abs())
        .max()
        .unwrap_or(Decimal::ZERO);
    if scale.is_zero() {
        Decimal::ONE
    } else {
        scale
    }
}

/// `|value| / scale < tolerance`, false when the ratio does not fit.
fn within_tolerance(value: Decimal, scale: Decimal, tolerance: Decimal) -> bool {
    value
        .checked_div(scale)
        .is_some_and(|ratio| ratio.abs() < tolerance)
}

/// Internal Rate of Return.
///
/// Newton-Raphson from 10%, guarded to the configured search range; if
/// Newton stalls or leaves the range, a grid scan looks for a sign change
/// of NPV inside the range and the bracket is closed by bisection.
pub fn irr(cash_flows: &[Money], settings: &SolverSettings) -> PreSiteResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(PreSiteError::NoIrrSolution {
            reason: "IRR requires at least 2 cash flows".into(),
        });
    }
    let has_positive = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    let has_negative = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    if !has_positive || !has_negative {
        return Err(PreSiteError::NoIrrSolution {
            reason: "cash flows never change sign".into(),
        });
    }

    let scale = flow_scale(cash_flows);
    let lower = settings.irr_lower_bound;
    let upper = settings.irr_upper_bound;

    if let Some(rate) = newton_irr(cash_flows, settings, scale) {
        return Ok(rate);
    }

    debug!("IRR Newton iteration failed, falling back to bracketing");
    let (lo, hi) = bracket(|r| npv(r, cash_flows), lower, upper).ok_or_else(|| {
        PreSiteError::NoIrrSolution {
            reason: format!("no sign change of NPV between {lower} and {upper}"),
        }
    })?;

    bisect(|r| npv(r, cash_flows), lo, hi, settings, scale, "IRR").map_err(|e| match e {
        PreSiteError::NoRootFound { reason, .. } => PreSiteError::NoIrrSolution { reason },
        other => other,
    })
}

fn newton_irr(cash_flows: &[Money], settings: &SolverSettings, scale: Decimal) -> Option<Rate> {
    let mut rate = IRR_INITIAL_GUESS;

    for _ in 0..settings.iterations() {
        let (npv_val, dnpv) = npv_and_derivative(rate, cash_flows)?;

        if within_tolerance(npv_val, scale, settings.tolerance) {
            return Some(rate);
        }
        if dnpv.is_zero() {
            return None;
        }

        rate = rate.checked_sub(npv_val.checked_div(dnpv)?)?;

        if rate <= settings.irr_lower_bound || rate >= settings.irr_upper_bound {
            return None;
        }
    }
    None
}

/// Scan `[lower, upper]` for two adjacent points where `f` changes sign.
///
/// The grid is fine (5%) up to +100% and coarse (50%) above; points where
/// `f` cannot be evaluated are skipped.
pub(crate) fn bracket<F>(f: F, lower: Decimal, upper: Decimal) -> Option<(Decimal, Decimal)>
where
    F: Fn(Decimal) -> PreSiteResult<Decimal>,
{
    let mut points = Vec::new();
    let mut x = lower;
    while x < upper {
        points.push(x);
        x += if x < Decimal::ONE { dec!(0.05) } else { dec!(0.5) };
    }
    points.push(upper);

    let mut prev: Option<(Decimal, Decimal)> = None;
    for p in points {
        let Ok(fp) = f(p) else {
            continue;
        };
        if fp.is_zero() {
            return Some((p, p));
        }
        if let Some((x0, f0)) = prev {
            if f0.is_sign_negative() != fp.is_sign_negative() {
                return Some((x0, p));
            }
        }
        prev = Some((p, fp));
    }
    None
}

/// Bisection on `[lo, hi]`, which must bracket a root of `f`.
///
/// Converges when `|f(x)| / scale` drops below the configured tolerance or
/// the bracket collapses; gives up with `NoRootFound` after the iteration cap.
pub fn bisect<F>(
    f: F,
    lo: Decimal,
    hi: Decimal,
    settings: &SolverSettings,
    scale: Decimal,
    function: &str,
) -> PreSiteResult<Decimal>
where
    F: Fn(Decimal) -> PreSiteResult<Decimal>,
{
    let (mut lo, mut hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    let scale = if scale.is_zero() { Decimal::ONE } else { scale.abs() };

    let mut f_lo = f(lo)?;
    if within_tolerance(f_lo, scale, settings.tolerance) {
        return Ok(lo);
    }
    let f_hi = f(hi)?;
    if within_tolerance(f_hi, scale, settings.tolerance) {
        return Ok(hi);
    }
    if f_lo.is_sign_negative() == f_hi.is_sign_negative() {
        return Err(PreSiteError::NoRootFound {
            function: function.into(),
            reason: format!("f({lo}) and f({hi}) have the same sign"),
        });
    }

    let width_floor = dec!(0.000000000000001);
    for i in 0..settings.iterations() {
        let mid = lo
            .checked_add(hi)
            .map(|sum| sum / dec!(2))
            .unwrap_or_else(|| lo / dec!(2) + hi / dec!(2));
        let collapsed = hi
            .checked_sub(lo)
            .is_some_and(|width| width / dec!(2) < width_floor);
        let f_mid = f(mid)?;

        if within_tolerance(f_mid, scale, settings.tolerance) || collapsed {
            debug!(function, iterations = i + 1, root = %mid, "bisection converged");
            return Ok(mid);
        }

        if f_mid.is_sign_negative() == f_lo.is_sign_negative() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(PreSiteError::NoRootFound {
        function: function.into(),
        reason: format!(
            "did not converge after {} iterations",
            settings.iterations()
        ),
    })
}

/// Modified Internal Rate of Return.
///
/// Positive flows are compounded to the final period at the reinvestment
/// rate, negative flows are discounted to period 0 at the finance rate, and
/// the n-th root of their ratio (less one) is the MIRR.
pub fn mirr(
    cash_flows: &[Money],
    finance_rate: Rate,
    reinvestment_rate: Rate,
) -> PreSiteResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(PreSiteError::InsufficientData(
            "MIRR requires at least 2 cash flows".into(),
        ));
    }
    if finance_rate <= dec!(-1) || reinvestment_rate <= dec!(-1) {
        return Err(PreSiteError::InvalidInput {
            field: "mirr_rates".into(),
            reason: "Finance and reinvestment rates must be greater than -100%".into(),
        });
    }

    let n = cash_flows.len() - 1;
    let mut fv_positive = Decimal::ZERO;
    let mut pv_negative = Decimal::ZERO;
    let one_plus_f = Decimal::ONE
        .checked_add(finance_rate)
        .ok_or_else(|| overflow("MIRR finance rate"))?;
    let one_plus_re = Decimal::ONE
        .checked_add(reinvestment_rate)
        .ok_or_else(|| overflow("MIRR reinvestment rate"))?;

    for (t, cf) in cash_flows.iter().enumerate() {
        if *cf > Decimal::ZERO {
            fv_positive = one_plus_re
                .checked_powi((n - t) as i64)
                .and_then(|growth| cf.checked_mul(growth))
                .and_then(|fv| fv_positive.checked_add(fv))
                .ok_or_else(|| overflow(format!("MIRR reinvested value of period {t}")))?;
        } else if *cf < Decimal::ZERO {
            let discount = one_plus_f
                .checked_powi(t as i64)
                .ok_or_else(|| overflow(format!("MIRR finance discount at period {t}")))?;
            let pv = cf.checked_div(discount).ok_or_else(|| PreSiteError::DivisionByZero {
                context: format!("MIRR finance discount at period {t}"),
            })?;
            pv_negative = pv_negative
                .checked_add(pv)
                .ok_or_else(|| overflow(format!("MIRR financed value of period {t}")))?;
        }
    }

    if fv_positive.is_zero() || pv_negative.is_zero() {
        return Err(PreSiteError::InsufficientData(
            "MIRR requires both positive and negative cash flows".into(),
        ));
    }

    let ratio = fv_positive
        .checked_div(-pv_negative)
        .ok_or_else(|| overflow("MIRR terminal ratio"))?;
    if n == 1 {
        return Ok(ratio - Decimal::ONE);
    }
    let root = ratio
        .checked_powd(Decimal::ONE / Decimal::from(n as i64))
        .ok_or_else(|| overflow("MIRR n-th root"))?;
    Ok(root - Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn settings() -> SolverSettings {
        SolverSettings::default()
    }

    #[test]
    fn test_npv_basic() {
        let cfs = vec![dec!(-1000), dec!(300), dec!(400), dec!(500)];
        let result = npv(dec!(0.10), &cfs).unwrap();
        // NPV at 10%: -1000 + 300/1.1 + 400/1.21 + 500/1.331 ≈ -21.04
        assert!((result - dec!(-21.04)).abs() < dec!(1.0));
    }

    #[test]
    fn test_npv_zero_rate() {
        let cfs = vec![dec!(-100), dec!(50), dec!(50), dec!(50)];
        let result = npv(dec!(0.0), &cfs).unwrap();
        assert_eq!(result, dec!(50));
    }

    #[test]
    fn test_npv_rejects_rate_at_minus_one() {
        assert!(npv(dec!(-1), &[dec!(-100), dec!(110)]).is_err());
    }

    #[test]
    fn test_irr_basic() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let result = irr(&cfs, &settings()).unwrap();
        // IRR should be ~9.7%
        assert!((result - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_irr_single_period_exact() {
        let cfs = vec![dec!(-100), dec!(115)];
        let result = irr(&cfs, &settings()).unwrap();
        assert!((result - dec!(0.15)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_irr_npv_round_trip() {
        let cfs = vec![dec!(-500000), dec!(52000), dec!(52000), dec!(830000)];
        let r = irr(&cfs, &settings()).unwrap();
        let residual = npv(r, &cfs).unwrap();
        assert!(residual.abs() < dec!(0.01), "residual={residual}");
    }

    #[test]
    fn test_irr_deeply_negative_uses_bracketing() {
        // Lose 95%: IRR is -95%, outside Newton's comfortable region.
        let cfs = vec![dec!(-1000), dec!(50)];
        let r = irr(&cfs, &settings()).unwrap();
        assert!((r - dec!(-0.95)).abs() < dec!(0.0001), "r={r}");
    }

    #[test]
    fn test_irr_no_sign_change() {
        let cfs = vec![dec!(-100), dec!(-10), dec!(-5)];
        let err = irr(&cfs, &settings()).unwrap_err();
        assert!(matches!(err, PreSiteError::NoIrrSolution { .. }));
    }

    #[test]
    fn test_irr_requires_two_flows() {
        let err = irr(&[dec!(-100)], &settings()).unwrap_err();
        assert!(matches!(err, PreSiteError::NoIrrSolution { .. }));
    }

    #[test]
    fn test_irr_root_outside_range() {
        // Doubling every period for 1 period = 1900% return, above a 10x cap.
        let cfs = vec![dec!(-1), dec!(20)];
        let err = irr(&cfs, &settings()).unwrap_err();
        assert!(matches!(err, PreSiteError::NoIrrSolution { .. }));
    }

    #[test]
    fn test_bisect_linear_root() {
        let root = bisect(
            |x| Ok(dec!(3) - x),
            dec!(0),
            dec!(10),
            &settings(),
            Decimal::ONE,
            "linear",
        )
        .unwrap();
        assert!((root - dec!(3)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_bisect_same_sign_fails() {
        let err = bisect(
            |x| Ok(x + dec!(1)),
            dec!(0),
            dec!(10),
            &settings(),
            Decimal::ONE,
            "shifted",
        )
        .unwrap_err();
        assert!(matches!(err, PreSiteError::NoRootFound { .. }));
    }

    #[test]
    fn test_mirr_known_answer() {
        // -1000, 400, 400, 400 at 10% finance and 12% reinvestment:
        // FV+ = 400*1.12^2 + 400*1.12 + 400 = 1349.76; MIRR = 1.34976^(1/3) - 1 ≈ 10.52%
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let m = mirr(&cfs, dec!(0.10), dec!(0.12)).unwrap();
        assert!((m - dec!(0.1052)).abs() < dec!(0.0005), "mirr={m}");
    }

    #[test]
    fn test_mirr_single_period() {
        let cfs = vec![dec!(-100), dec!(120)];
        assert_eq!(mirr(&cfs, dec!(0.1), dec!(0.1)).unwrap(), dec!(0.2));
    }

    #[test]
    fn test_mirr_requires_both_signs() {
        let cfs = vec![dec!(100), dec!(120)];
        assert!(mirr(&cfs, dec!(0.1), dec!(0.1)).is_err());
    }

    #[test]
    fn test_mirr_overflowing_reinvestment_is_an_error() {
        // 3^59 times a six-figure flow is past the Decimal range.
        let mut cfs = vec![dec!(-500000)];
        cfs.extend(std::iter::repeat(dec!(52062.5)).take(60));
        let err = mirr(&cfs, dec!(2), dec!(2)).unwrap_err();
        assert!(matches!(err, PreSiteError::Overflow { .. }));
    }

    #[test]
    fn test_npv_of_huge_flows_is_an_error_not_a_panic() {
        let cfs = vec![Decimal::MAX, Decimal::MAX];
        let err = npv(dec!(0), &cfs).unwrap_err();
        assert!(matches!(err, PreSiteError::Overflow { .. }));
    }

    #[test]
    fn test_bisect_midpoint_of_extreme_bracket() {
        let root = bisect(
            |x| Ok(-x),
            -Decimal::MAX,
            Decimal::MAX,
            &settings(),
            Decimal::ONE,
            "wide",
        )
        .unwrap();
        assert!(root.abs() < dec!(0.000001));
    }
}
