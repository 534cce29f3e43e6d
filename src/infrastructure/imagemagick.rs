//! Page layout for the dye-sublimation printer through ImageMagick `convert`.

use crate::config::PrinterConfig;
use crate::domain::ports::PagePreparer;
use crate::error::{KioskError, Result};
use crate::infrastructure::command;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub struct ImageMagickPage {
    convert: String,
    width: u32,
    height: u32,
    timeout: Duration,
}

impl ImageMagickPage {
    pub fn new(config: &PrinterConfig) -> Self {
        Self {
            convert: config.convert.clone(),
            width: config.page_width,
            height: config.page_height,
            timeout: Duration::from_secs(config.prepare_timeout_secs),
        }
    }
}

/// Arguments that turn a portrait image landscape, shrink it to fit the page and centre it
/// on white. Landscape images are left unrotated and small ones are not enlarged.
pub fn page_args(source: &Path, target: &Path, width: u32, height: u32) -> Vec<String> {
    let page = format!("{width}x{height}");
    vec![
        source.display().to_string(),
        "-rotate".to_string(),
        "90<".to_string(),
        "-resize".to_string(),
        format!("{page}>"),
        "-background".to_string(),
        "white".to_string(),
        "-gravity".to_string(),
        "center".to_string(),
        "-extent".to_string(),
        page,
        target.display().to_string(),
    ]
}

#[async_trait]
impl PagePreparer for ImageMagickPage {
    async fn prepare(&self, source: &Path, target: &Path) -> Result<()> {
        let args = page_args(source, target, self.width, self.height);
        command::run_checked(&self.convert, args, self.timeout)
            .await
            .map_err(|e| KioskError::PrintError(format!("page preparation failed: {e}")))?;
        info!(
            source = %source.display(),
            width = self.width,
            height = self.height,
            "print page prepared"
        );
        Ok(())
    }
}
