use image::DynamicImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::Result;
use tracing::debug;

/// Bounding box in the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Data that flows through the step pipeline
/// Each PipelineData is a whole image or one region of it, with associated metadata
#[derive(Clone)]
pub struct PipelineData {
    /// Current working image (grayscale, binary, or a cropped region)
    pub image: DynamicImage,

    /// Reference to the source image (shared via Arc)
    pub original: Arc<DynamicImage>,

    /// Region in the source image (None means full image)
    pub bbox: Option<BoundingBox>,

    /// Properties attached by steps (e.g. "fill_ratio", "side")
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone)]
pub enum MetadataValue {
    Float(f32),
    Int(i64),
}

impl PipelineData {
    /// Create PipelineData for a full image
    pub fn from_image(image: DynamicImage) -> Self {
        let original = Arc::new(image.clone());
        Self {
            image,
            original,
            bbox: None,
            metadata: HashMap::new(),
        }
    }

    /// Create PipelineData for a region of an image
    pub fn from_region(
        image: DynamicImage,
        original: Arc<DynamicImage>,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            image,
            original,
            bbox: Some(bbox),
            metadata: HashMap::new(),
        }
    }

    /// Same region and metadata, different working image
    pub fn with_image(&self, image: DynamicImage) -> Self {
        Self {
            image,
            original: self.original.clone(),
            bbox: self.bbox,
            metadata: self.metadata.clone(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_float(&self, key: &str) -> Option<f32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

/// Where intermediate images are dumped
#[derive(Clone, Debug)]
pub struct DebugConfig {
    pub output_dir: PathBuf,
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps implement
pub trait PipelineStep: Send + Sync {
    /// Steps can split data (1 → many), filter (many → fewer), or transform (many → many)
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>>;

    /// Human-readable name (used in logs and debug directory names)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Enable debug dumps into `output_dir`
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Run every step in order on one input image
    pub fn run(&self, input: DynamicImage) -> Result<Vec<PipelineData>> {
        if let Some(debug_config) = &self.context.debug {
            dump_images(&debug_config.output_dir, "00_input", std::slice::from_ref(&input))?;
        }

        let mut data = vec![PipelineData::from_image(input)];

        for (step_idx, step) in self.steps.iter().enumerate() {
            debug!(step = step.name(), items = data.len(), "Running pipeline step");
            data = step.process(data, &self.context)?;

            if let Some(debug_config) = &self.context.debug {
                let step_dir_name = format!("{:02}_{}", step_idx + 1,
                    step.name().to_lowercase().replace(' ', "_"));
                let images: Vec<DynamicImage> = data.iter().map(|item| item.image.clone()).collect();
                dump_images(&debug_config.output_dir, &step_dir_name, &images)?;
            }

            debug!(step = step.name(), items = data.len(), "Pipeline step finished");
        }

        Ok(data)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn dump_images(root: &Path, dir_name: &str, images: &[DynamicImage]) -> Result<()> {
    let step_dir = root.join(dir_name);
    std::fs::create_dir_all(&step_dir)?;

    for (idx, image) in images.iter().enumerate() {
        let output_path = step_dir.join(format!("{:02}.png", idx + 1));
        image.save(&output_path)
            .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;
    }

    debug!(dir = dir_name, count = images.len(), "Saved debug images");
    Ok(())
}
