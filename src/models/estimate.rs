use serde::{Deserialize, Serialize};

pub const FALLBACK_PRICE_RANGE: &str = "要見積もり";
pub const FALLBACK_PLAN_RECOMMENDATION: &str = "担当者確認中";
pub const FALLBACK_REASONING: &str =
    "画像の解析に失敗しました。担当者が確認後に正確な見積もりをお出しします。";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Estimate {
    pub price_range: String,
    pub plan_recommendation: String,
    pub reasoning: String,
}

impl Estimate {
    pub fn fallback() -> Self {
        Self {
            price_range: FALLBACK_PRICE_RANGE.to_string(),
            plan_recommendation: FALLBACK_PLAN_RECOMMENDATION.to_string(),
            reasoning: FALLBACK_REASONING.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }

    pub fn annotation(&self) -> String {
        format!("{} ({})", self.plan_recommendation, self.price_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_values() {
        let fallback = Estimate::fallback();
        assert_eq!(fallback.price_range, "要見積もり");
        assert_eq!(fallback.plan_recommendation, "担当者確認中");
        assert_eq!(
            fallback.reasoning,
            "画像の解析に失敗しました。担当者が確認後に正確な見積もりをお出しします。"
        );
        assert!(fallback.is_fallback());
    }

    #[test]
    fn test_annotation_format() {
        let estimate = Estimate {
            price_range: "25,000円-45,000円".to_string(),
            plan_recommendation: "1tトラックパック".to_string(),
            reasoning: "家具が複数あります".to_string(),
        };
        assert_eq!(estimate.annotation(), "1tトラックパック (25,000円-45,000円)");
        assert!(!estimate.is_fallback());
    }

    #[test]
    fn test_parses_camel_case_json() {
        let json = r#"{"priceRange":"15,000円 - 20,000円","planRecommendation":"軽トラパック","reasoning":"少量です"}"#;
        let estimate: Estimate = serde_json::from_str(json).unwrap();
        assert_eq!(estimate.plan_recommendation, "軽トラパック");
        assert_eq!(estimate.price_range, "15,000円 - 20,000円");
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let json = r#"{"priceRange":"15,000円","reasoning":"少量です"}"#;
        assert!(serde_json::from_str::<Estimate>(json).is_err());
    }

    #[test]
    fn test_extra_field_is_rejected() {
        let json = r#"{"priceRange":"15,000円","planRecommendation":"軽トラパック","reasoning":"少量です","confidence":"high"}"#;
        assert!(serde_json::from_str::<Estimate>(json).is_err());
    }
}
