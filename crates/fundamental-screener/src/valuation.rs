use screening_core::ValuationStatus;

/// Buckets FCF yield. Both edges of the FAIR band are inclusive: a yield
/// equal to `bargain_threshold` is FAIR, a yield equal to `fair_threshold` is
/// FAIR. NaN falls through to PRICEY.
pub struct ValuationClassifier {
    bargain_threshold: f64,
    fair_threshold: f64,
}

impl ValuationClassifier {
    pub fn new(bargain_threshold: f64, fair_threshold: f64) -> Self {
        Self {
            bargain_threshold,
            fair_threshold,
        }
    }

    pub fn classify(&self, fcf_yield: f64) -> ValuationStatus {
        if fcf_yield > self.bargain_threshold {
            ValuationStatus::Bargain
        } else if fcf_yield >= self.fair_threshold {
            ValuationStatus::Fair
        } else {
            ValuationStatus::Pricey
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ValuationClassifier {
        ValuationClassifier::new(8.0, 4.5)
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(classifier().classify(8.0), ValuationStatus::Fair);
        assert_eq!(classifier().classify(8.0001), ValuationStatus::Bargain);
        assert_eq!(classifier().classify(4.5), ValuationStatus::Fair);
        assert_eq!(classifier().classify(4.4999), ValuationStatus::Pricey);
    }

    #[test]
    fn test_bands() {
        assert_eq!(classifier().classify(12.0), ValuationStatus::Bargain);
        assert_eq!(classifier().classify(6.0), ValuationStatus::Fair);
        assert_eq!(classifier().classify(1.0), ValuationStatus::Pricey);
        assert_eq!(classifier().classify(0.0), ValuationStatus::Pricey);
        assert_eq!(classifier().classify(-3.0), ValuationStatus::Pricey);
    }

    #[test]
    fn test_nan_is_pricey() {
        assert_eq!(classifier().classify(f64::NAN), ValuationStatus::Pricey);
    }
}
