//! Shared application state.

use crate::convert::ConversionService;
use std::sync::Arc;

const INDEX_TEMPLATE: &str = include_str!("../../assets/index.html");

/// Cloned into every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub service: ConversionService,
    index_html: Arc<str>,
}

impl AppState {
    pub fn new(service: ConversionService) -> Self {
        let index_html = render_index(&service.config().image_base_url);
        Self {
            service,
            index_html: Arc::from(index_html),
        }
    }

    /// The upload page, rendered once at startup.
    pub fn index_html(&self) -> &str {
        &self.index_html
    }
}

fn render_index(image_base_url: &str) -> String {
    INDEX_TEMPLATE.replace("{{ image_base_url }}", image_base_url)
}
