//! Equipment Photo Pro - Enhancement Pipeline
//!
//! AI first when configured; local filters when the AI is missing, over
//! quota, failing, or only describes the photo. Every result is
//! watermarked and written as JPEG.

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use serde::Serialize;

use crate::ai::{AiOutcome, ImageGenerator};
use crate::error::AppResult;
use crate::filters::{
    ai_guided_steps, apply_steps, encode_jpeg, manual_steps, FilterSettings, FilterStep,
    JPEG_QUALITY,
};
use crate::watermark::apply_watermark;

/// How an image ended up enhanced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnhancementMethod {
    /// Image generated by the model
    Ai,
    /// Model answered with text; the guided filter chain was applied
    AiGuidedFilters,
    Filters,
}

impl EnhancementMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::AiGuidedFilters => "ai-guided-filters",
            Self::Filters => "filters",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementReport {
    pub method: EnhancementMethod,
    pub watermarked: bool,
    pub width: u32,
    pub height: u32,
    pub output_size: u64,
    /// Why the AI result was not used, when it wasn't
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

struct Rendered {
    jpeg: Vec<u8>,
    watermarked: bool,
    width: u32,
    height: u32,
}

/// Output plus the method and fallback reason that actually applied
type Rendering = (Rendered, EnhancementMethod, Option<String>);

/// Decode, filter, watermark, encode. CPU-bound.
fn render(source: &[u8], steps: &[FilterStep]) -> AppResult<Rendered> {
    let img = image::load_from_memory(source)?;
    let img = apply_steps(img, steps);
    let (img, watermarked): (DynamicImage, bool) = apply_watermark(img);
    let (width, height) = img.dimensions();

    Ok(Rendered {
        jpeg: encode_jpeg(&img, JPEG_QUALITY)?,
        watermarked,
        width,
        height,
    })
}

/// Image enhancement engine
pub struct Enhancer {
    generator: Option<Arc<dyn ImageGenerator>>,
}

impl Enhancer {
    /// Create new enhancer; `None` means local filters only
    pub fn new(generator: Option<Arc<dyn ImageGenerator>>) -> Self {
        Self { generator }
    }

    pub fn ai_configured(&self) -> bool {
        self.generator.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.generator.as_deref().map(|g| g.model_name())
    }

    /// Enhance `input` into `output` (JPEG)
    pub async fn enhance(
        &self,
        input: &Path,
        output: &Path,
        mime: &str,
        settings: FilterSettings,
        prompt: &str,
    ) -> AppResult<EnhancementReport> {
        let original = tokio::fs::read(input).await?;

        let mut method = EnhancementMethod::Filters;
        let mut steps = manual_steps(&settings);
        let mut generated = None;
        let mut fallback_reason = None;
        let mut analysis = None;

        match &self.generator {
            None => fallback_reason = Some("AI not configured".to_string()),
            Some(generator) => match generator.enhance(&original, mime, prompt).await {
                Ok(AiOutcome::Image { data, .. }) => {
                    method = EnhancementMethod::Ai;
                    generated = Some(data);
                }
                Ok(AiOutcome::Analysis { text }) => {
                    method = EnhancementMethod::AiGuidedFilters;
                    steps = ai_guided_steps(&settings);
                    fallback_reason = Some("AI provided analysis instead of an image".to_string());
                    analysis = Some(text);
                }
                Ok(AiOutcome::QuotaExceeded) => {
                    fallback_reason = Some("AI quota exceeded".to_string());
                }
                Err(e) => {
                    tracing::warn!(input = %input.display(), "AI enhancement failed, using filters: {}", e);
                    fallback_reason = Some(format!("AI enhancement failed: {e}"));
                }
            },
        }

        let (rendered, method, fallback_reason) = tokio::task::spawn_blocking(move || -> AppResult<Rendering> {
            if let Some(data) = generated {
                match render(&data, &[]) {
                    Ok(r) => return Ok((r, method, fallback_reason)),
                    Err(e) => {
                        tracing::warn!("AI image could not be decoded, using filters: {}", e);
                        let r = render(&original, &manual_steps(&settings))?;
                        let reason = format!("AI image unreadable: {e}");
                        return Ok((r, EnhancementMethod::Filters, Some(reason)));
                    }
                }
            }
            render(&original, &steps).map(|r| (r, method, fallback_reason))
        })
        .await??;

        tokio::fs::write(output, &rendered.jpeg).await?;

        tracing::info!(
            output = %output.display(),
            method = method.as_str(),
            watermarked = rendered.watermarked,
            "image enhanced"
        );

        Ok(EnhancementReport {
            method,
            watermarked: rendered.watermarked,
            width: rendered.width,
            height: rendered.height,
            output_size: rendered.jpeg.len() as u64,
            fallback_reason,
            analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiError, AiResult};
    use async_trait::async_trait;
    use std::io::Cursor;
    use tempfile::tempdir;

    struct Fixed(fn() -> AiResult<AiOutcome>);

    #[async_trait]
    impl ImageGenerator for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn enhance(&self, _: &[u8], _: &str, _: &str) -> AiResult<AiOutcome> {
            (self.0)()
        }

        async fn suggestions(&self, _: &[u8], _: &str) -> AiResult<Vec<String>> {
            Ok(vec![])
        }
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img =
            DynamicImage::ImageRgb8(image::RgbImage::from_pixel(w, h, image::Rgb([60, 90, 40])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
        buf
    }

    async fn run(enhancer: &Enhancer) -> (EnhancementReport, Vec<u8>) {
        let dir = tempdir().unwrap();
        let input = dir.path().join("images-1-a.png");
        let output = dir.path().join("enhanced-images-1-a.jpg");
        std::fs::write(&input, png(400, 300)).unwrap();

        let report = enhancer
            .enhance(&input, &output, "image/png", FilterSettings::default(), "prompt")
            .await
            .unwrap();
        (report, std::fs::read(&output).unwrap())
    }

    #[tokio::test]
    async fn test_filters_without_ai() {
        let enhancer = Enhancer::new(None);
        assert!(!enhancer.ai_configured());

        let (report, jpeg) = run(&enhancer).await;
        assert_eq!(report.method, EnhancementMethod::Filters);
        assert!(report.watermarked);
        assert_eq!((report.width, report.height), (400, 300));
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(report.output_size, jpeg.len() as u64);
    }

    #[tokio::test]
    async fn test_generated_image_used() {
        let enhancer = Enhancer::new(Some(Arc::new(Fixed(|| {
            Ok(AiOutcome::Image {
                data: png(640, 480),
                mime: "image/png".into(),
            })
        }))));

        let (report, jpeg) = run(&enhancer).await;
        assert_eq!(report.method, EnhancementMethod::Ai);
        assert_eq!((report.width, report.height), (640, 480));
        assert!(report.fallback_reason.is_none());
        assert_eq!(image::load_from_memory(&jpeg).unwrap().dimensions(), (640, 480));
    }

    #[tokio::test]
    async fn test_analysis_uses_guided_filters() {
        let enhancer = Enhancer::new(Some(Arc::new(Fixed(|| {
            Ok(AiOutcome::Analysis {
                text: "A green tractor".into(),
            })
        }))));

        let (report, _) = run(&enhancer).await;
        assert_eq!(report.method, EnhancementMethod::AiGuidedFilters);
        assert_eq!(report.analysis.as_deref(), Some("A green tractor"));
    }

    #[tokio::test]
    async fn test_quota_and_errors_fall_back() {
        let quota = Enhancer::new(Some(Arc::new(Fixed(|| Ok(AiOutcome::QuotaExceeded)))));
        let (report, _) = run(&quota).await;
        assert_eq!(report.method, EnhancementMethod::Filters);
        assert_eq!(report.fallback_reason.as_deref(), Some("AI quota exceeded"));

        let failing = Enhancer::new(Some(Arc::new(Fixed(|| Err(AiError::EmptyResponse)))));
        let (report, _) = run(&failing).await;
        assert_eq!(report.method, EnhancementMethod::Filters);
    }

    #[tokio::test]
    async fn test_unreadable_ai_image_falls_back() {
        let enhancer = Enhancer::new(Some(Arc::new(Fixed(|| {
            Ok(AiOutcome::Image {
                data: b"not an image".to_vec(),
                mime: "image/png".into(),
            })
        }))));

        let (report, _) = run(&enhancer).await;
        assert_eq!(report.method, EnhancementMethod::Filters);
        assert!(report.fallback_reason.unwrap().contains("unreadable"));
    }

    #[test]
    fn test_method_names() {
        assert_eq!(EnhancementMethod::AiGuidedFilters.as_str(), "ai-guided-filters");
        assert_eq!(
            serde_json::to_string(&EnhancementMethod::AiGuidedFilters).unwrap(),
            "\"ai-guided-filters\""
        );
    }
}
