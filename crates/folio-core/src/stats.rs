use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Variant names used by every experiment, in table order.
pub const VARIANTS: [&str; 2] = ["control", "treatment"];

/// Critical values of the chi-squared distribution with one degree of
/// freedom for p = 0.10, 0.05 and 0.01.
pub const CHI2_P10: f64 = 2.706;
pub const CHI2_P05: f64 = 3.841;
pub const CHI2_P01: f64 = 6.635;

/// Participants and conversions observed for one experiment variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantCounts {
    pub name: String,
    pub participants: u64,
    pub conversions: u64,
}

impl VariantCounts {
    pub fn conversion_rate(&self) -> f64 {
        if self.participants == 0 {
            0.0
        } else {
            self.conversions as f64 / self.participants as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Significance {
    NotSignificant,
    Marginal,
    Significant,
    HighlySignificant,
}

impl Significance {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotSignificant => "Not significant",
            Self::Marginal => "Marginally significant",
            Self::Significant => "Significant",
            Self::HighlySignificant => "Highly significant",
        }
    }
}

/// Pearson chi-squared statistic of the 2x2 table formed by the first two
/// variants (converted / not converted). Fewer than two variants yield 0.
pub fn chi_squared(variants: &[VariantCounts]) -> f64 {
    let (a, b) = match variants {
        [a, b, ..] => (a, b),
        _ => return 0.0,
    };

    let observed = [
        [
            a.conversions as f64,
            a.participants.saturating_sub(a.conversions) as f64,
        ],
        [
            b.conversions as f64,
            b.participants.saturating_sub(b.conversions) as f64,
        ],
    ];

    let row_totals = [observed[0][0] + observed[0][1], observed[1][0] + observed[1][1]];
    let col_totals = [observed[0][0] + observed[1][0], observed[0][1] + observed[1][1]];
    let total = row_totals[0] + row_totals[1];
    if total == 0.0 {
        return 0.0;
    }

    let mut chi = 0.0;
    for (row, cells) in observed.iter().enumerate() {
        for (col, &o) in cells.iter().enumerate() {
            let expected = row_totals[row] * col_totals[col] / total;
            if expected > 0.0 {
                chi += (o - expected).powi(2) / expected;
            }
        }
    }
    chi
}

pub fn significance(chi_squared: f64) -> Significance {
    if chi_squared >= CHI2_P01 {
        Significance::HighlySignificant
    } else if chi_squared >= CHI2_P05 {
        Significance::Significant
    } else if chi_squared >= CHI2_P10 {
        Significance::Marginal
    } else {
        Significance::NotSignificant
    }
}

/// Deterministic bucket for a user: the same experiment and user always
/// land in the same variant.
pub fn assign_variant(experiment: &str, user_id: Uuid) -> &'static str {
    let digest = Sha256::new()
        .chain_update(experiment.as_bytes())
        .chain_update(b":")
        .chain_update(user_id.as_bytes())
        .finalize();
    VARIANTS[usize::from(digest[0]) % VARIANTS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(name: &str, participants: u64, conversions: u64) -> VariantCounts {
        VariantCounts {
            name: name.to_string(),
            participants,
            conversions,
        }
    }

    #[test]
    fn identical_rates_give_zero() {
        let chi = chi_squared(&[variant("control", 100, 10), variant("treatment", 200, 20)]);
        assert_eq!(chi, 0.0);
    }

    #[test]
    fn single_or_no_variant_gives_zero() {
        assert_eq!(chi_squared(&[variant("control", 500, 40)]), 0.0);
        assert_eq!(chi_squared(&[]), 0.0);
    }

    #[test]
    fn empty_variants_give_zero() {
        assert_eq!(chi_squared(&[variant("a", 0, 0), variant("b", 0, 0)]), 0.0);
    }

    #[test]
    fn known_table() {
        // 20/100 vs 40/100: chi^2 = 200 * (20*60 - 80*40)^2 / (100*100*60*140) = 9.5238...
        let chi = chi_squared(&[variant("a", 100, 20), variant("b", 100, 40)]);
        assert!((chi - 9.5238).abs() < 1e-3, "chi = {}", chi);
        assert_eq!(significance(chi), Significance::HighlySignificant);
    }

    #[test]
    fn only_first_two_variants_count() {
        let two = chi_squared(&[variant("a", 100, 20), variant("b", 100, 40)]);
        let three = chi_squared(&[
            variant("a", 100, 20),
            variant("b", 100, 40),
            variant("c", 100, 90),
        ]);
        assert_eq!(two, three);
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(significance(0.0), Significance::NotSignificant);
        assert_eq!(significance(2.7059), Significance::NotSignificant);
        assert_eq!(significance(2.706), Significance::Marginal);
        assert_eq!(significance(3.841), Significance::Significant);
        assert_eq!(significance(6.635), Significance::HighlySignificant);
        assert_eq!(Significance::Marginal.label(), "Marginally significant");
    }

    #[test]
    fn assignment_is_stable_and_spread() {
        let user = Uuid::new_v4();
        let first = assign_variant("goal-reminder", user);
        for _ in 0..10 {
            assert_eq!(assign_variant("goal-reminder", user), first);
        }

        let treatment = (0..400)
            .filter(|_| assign_variant("goal-reminder", Uuid::new_v4()) == "treatment")
            .count();
        assert!((100..300).contains(&treatment), "treatment = {}", treatment);
    }

    #[test]
    fn conversion_rate_handles_empty_variant() {
        assert_eq!(variant("a", 0, 0).conversion_rate(), 0.0);
        assert_eq!(variant("a", 4, 1).conversion_rate(), 0.25);
    }
}
