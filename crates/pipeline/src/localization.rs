//! Gate 4: component localization.

use fixit_core::{BoundingBox, DeviceAssessment, ImagePart, RawSpatialResponse, Result, SpatialAssessment};
use fixit_model_gateway::InferenceGateway;

use crate::policy::{contains_phrase, words};
use crate::prompts;

/// Keyword table for naming a component from free text. First match wins.
const COMPONENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("reset button", &["reset", "reset button"]),
    ("power button", &["power button", "power switch", "on/off"]),
    ("power port", &["power", "power port", "power jack", "power socket"]),
    ("ethernet port", &["ethernet", "lan port", "network port"]),
    ("usb port", &["usb", "usb port"]),
    ("hdmi port", &["hdmi"]),
    ("led indicator", &["light", "lights", "led", "leds", "indicator", "blinking"]),
    ("screen", &["screen", "display", "monitor"]),
    ("speaker", &["speaker", "audio"]),
    ("microphone", &["microphone", "mic"]),
    ("camera", &["camera", "webcam"]),
    ("antenna", &["antenna", "wifi antenna"]),
];

/// Name the component a query is about, from the keyword table and then
/// from the detected components.
pub fn component_from_query(query: &str, components: &[String]) -> Option<String> {
    let tokens = words(query);

    for (component, patterns) in COMPONENT_KEYWORDS {
        if patterns.iter().any(|p| contains_phrase(&tokens, p)) {
            return Some((*component).to_string());
        }
    }

    components.iter().find(|c| contains_phrase(&tokens, c)).cloned()
}

/// Target for localization and step synthesis. Never empty.
pub fn resolve_target(explicit: Option<&str>, query: &str, components: &[String]) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| component_from_query(query, components))
        .unwrap_or_else(|| format!("component relevant to: {}", query))
}

/// Locates one component through the gateway.
#[derive(Debug, Clone)]
pub struct SpatialLocator {
    threshold: f64,
}

impl SpatialLocator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// `Ok(None)` when the gateway reported quota exhaustion.
    pub async fn locate(
        &self,
        gateway: &InferenceGateway,
        image: &ImagePart,
        target: &str,
        dims: (u32, u32),
        device: &DeviceAssessment,
    ) -> Result<Option<SpatialAssessment>> {
        let request = prompts::localization(image, target, device);
        let Some(raw) = gateway.call_as::<RawSpatialResponse>(&request).await? else {
            tracing::warn!(target, "Localization skipped, quota exhausted");
            return Ok(None);
        };

        let assessment = self.process(raw, target, dims);
        tracing::info!(
            target,
            visible = assessment.component_visible,
            confidence = assessment.confidence,
            has_bbox = assessment.bounding_box.is_some(),
            "Localization complete"
        );
        Ok(Some(assessment))
    }

    /// Scale the 0-1000 box to pixels. The box survives only when the
    /// component is visible and confidence reaches the threshold.
    pub fn process(&self, raw: RawSpatialResponse, target: &str, (width, height): (u32, u32)) -> SpatialAssessment {
        let confidence = if raw.confidence.is_nan() {
            0.0
        } else {
            raw.confidence.clamp(0.0, 1.0)
        };

        let bounding_box = raw
            .bounding_box
            .filter(|_| raw.component_visible && confidence >= self.threshold)
            .map(|b| {
                let (w, h) = (f64::from(width), f64::from(height));
                BoundingBox {
                    x_min: (b.xmin / 1000.0 * w).trunc(),
                    y_min: (b.ymin / 1000.0 * h).trunc(),
                    x_max: (b.xmax / 1000.0 * w).trunc(),
                    y_max: (b.ymax / 1000.0 * h).trunc(),
                }
            });

        SpatialAssessment {
            component: target.to_string(),
            component_visible: raw.component_visible,
            visibility_reason: non_blank(raw.visibility_reason),
            spatial_description: Some(
                non_blank(raw.spatial_description).unwrap_or_else(|| "Location not identified".to_string()),
            ),
            bounding_box,
            confidence,
            visible_alternatives: raw.visible_alternatives,
            typical_location: non_blank(raw.typical_location),
            suggested_action: non_blank(raw.suggested_action),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixit_core::NormalizedBox;

    fn raw(visible: bool, confidence: f64) -> RawSpatialResponse {
        RawSpatialResponse {
            component_visible: visible,
            confidence,
            spatial_description: Some("rear panel, bottom left".into()),
            bounding_box: Some(NormalizedBox {
                ymin: 500.0,
                xmin: 100.0,
                ymax: 750.0,
                xmax: 1100.0,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_box_scaled_to_pixels() {
        let locator = SpatialLocator::new(0.4);
        let out = locator.process(raw(true, 0.9), "reset button", (640, 480));
        let bbox = out.bounding_box.unwrap();

        assert_eq!(bbox.x_min, 64.0);
        assert_eq!(bbox.y_min, 240.0);
        assert_eq!(bbox.y_max, 360.0);
        // Out-of-range input is scaled as-is and clamped later.
        assert_eq!(bbox.x_max, 704.0);
        assert_eq!(out.component, "reset button");
    }

    #[test]
    fn test_box_dropped_below_threshold_or_invisible() {
        let locator = SpatialLocator::new(0.4);
        assert!(locator.process(raw(true, 0.39), "x", (640, 480)).bounding_box.is_none());
        assert!(locator.process(raw(false, 0.9), "x", (640, 480)).bounding_box.is_none());
        assert!(locator.process(raw(true, 0.4), "x", (640, 480)).bounding_box.is_some());
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let locator = SpatialLocator::new(0.4);
        let out = locator.process(
            RawSpatialResponse {
                typical_location: Some("  ".into()),
                ..Default::default()
            },
            "antenna",
            (100, 100),
        );
        assert_eq!(out.spatial_description.as_deref(), Some("Location not identified"));
        assert!(out.typical_location.is_none());
        assert!(!out.component_visible);
    }

    #[test]
    fn test_component_from_query() {
        let none: Vec<String> = Vec::new();
        assert_eq!(component_from_query("Where is the RESET button?", &none).as_deref(), Some("reset button"));
        assert_eq!(component_from_query("why is it blinking", &none).as_deref(), Some("led indicator"));

        let detected = vec!["Toner cartridge".to_string()];
        assert_eq!(
            component_from_query("how do I swap the toner cartridge", &detected).as_deref(),
            Some("Toner cartridge")
        );
        assert!(component_from_query("it is broken", &detected).is_none());
    }

    #[test]
    fn test_component_keywords_match_whole_words() {
        let none: Vec<String> = Vec::new();
        assert!(component_from_query("the update failed", &none).is_none());
        assert!(component_from_query("it was installed yesterday", &none).is_none());
        assert!(component_from_query("dynamic range looks off", &none).is_none());
        assert_eq!(component_from_query("the mic is muted", &none).as_deref(), Some("microphone"));
        assert_eq!(component_from_query("press the on/off switch", &none).as_deref(), Some("power button"));
    }

    #[test]
    fn test_resolve_target_fallback() {
        assert_eq!(resolve_target(Some("fan"), "reset", &[]), "fan");
        assert_eq!(resolve_target(None, "it is broken", &[]), "component relevant to: it is broken");
    }
}
