/// Instruction sent alongside the before and after images.
pub fn comparison_instruction(context_label: &str) -> String {
    format!(
        r#"Analyze these two forest images and return ONLY valid JSON. No other text.

Image 1: Before image
Image 2: After image
Location: {context_label}

Report every score as a percentage between 0 and 100 measured from the images themselves.
Use exactly these keys (the values below only illustrate the types):
{{
  "vegetation_score_image1": 85.5,
  "vegetation_score_image2": 72.3,
  "vegetation_loss_percentage": 15.4,
  "vegetation_health_image1": "Healthy dense forest with good canopy coverage",
  "vegetation_health_image2": "Moderate degradation with some areas showing stress",
  "land_use_changes": "Evidence of selective logging and minor road development",
  "analysis_summary": "Overall description of the changes between the two images.",
  "recommendations": ["Implement reforestation in degraded areas"],
  "confidence_score": 92.5,
  "key_findings": ["15.4% reduction in forest cover"]
}}

IMPORTANT: Return ONLY the JSON object, no explanations or additional text."#
    )
}

#[cfg(test)]
mod tests {
    use super::comparison_instruction;

    #[test]
    fn instruction_names_location_and_required_keys() {
        let instruction = comparison_instruction("Amazon - Point 4");
        assert!(instruction.contains("Location: Amazon - Point 4"));
        for key in [
            "vegetation_score_image1",
            "vegetation_score_image2",
            "vegetation_loss_percentage",
            "confidence_score",
            "key_findings",
        ] {
            assert!(instruction.contains(key), "missing {key}");
        }
        assert!(instruction.contains("Return ONLY the JSON object"));
    }

    #[test]
    fn example_block_is_itself_decodable_json() -> anyhow::Result<()> {
        let instruction = comparison_instruction("x");
        let start = instruction.find('{').unwrap_or(0);
        let end = instruction.rfind('}').unwrap_or(0);
        let example: serde_json::Value = serde_json::from_str(&instruction[start..=end])?;
        assert_eq!(example["vegetation_loss_percentage"], serde_json::json!(15.4));
        Ok(())
    }
}
