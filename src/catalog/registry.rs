//! The stream registry

use super::types::{SelectedStream, StreamDefinition};
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::gateway::Filter;

/// Registry of every stream the source can read
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    streams: Vec<StreamDefinition>,
}

impl Catalog {
    /// Create a catalog from top-level definitions
    pub fn new(streams: Vec<StreamDefinition>) -> Self {
        Self { streams }
    }

    /// The standard streams, with document types taken from the config
    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(build_streams(
            &config.oe_invoice_docparid,
            &config.oe_order_docparid,
        ))
    }

    /// Find a stream, child streams included
    pub fn lookup(&self, name: &str) -> Result<&StreamDefinition> {
        self.all_streams()
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::StreamNotFound {
                stream: name.to_string(),
            })
    }

    /// Every stream, each parent followed by its children
    pub fn all_streams(&self) -> Vec<&StreamDefinition> {
        self.streams.iter().flat_map(StreamDefinition::family).collect()
    }

    /// Top-level streams only
    pub fn top_level(&self) -> &[StreamDefinition] {
        &self.streams
    }

    /// Top-level stream whose family contains `name`
    pub fn family_of(&self, name: &str) -> Option<&StreamDefinition> {
        self.streams
            .iter()
            .find(|s| s.family().iter().any(|d| d.name == name))
    }

    /// Group requested stream names by family. An empty request selects
    /// everything, a parent brings its children along, and a child alone
    /// drives its parent without emitting it. Families keep catalog order.
    pub fn select(&self, names: &[String]) -> Result<Vec<SelectedStream>> {
        if names.is_empty() {
            return Ok(self.streams.iter().cloned().map(SelectedStream::all).collect());
        }

        for name in names {
            self.lookup(name)?;
        }

        let selected = self
            .streams
            .iter()
            .filter_map(|top| {
                // Naming the parent selects its children too
                if names.contains(&top.name) {
                    return Some(SelectedStream::all(top.clone()));
                }
                let emitted: Vec<String> = top
                    .family()
                    .iter()
                    .map(|d| d.name.clone())
                    .filter(|n| names.contains(n))
                    .collect();
                (!emitted.is_empty()).then(|| SelectedStream {
                    definition: top.clone(),
                    emitted,
                })
            })
            .collect();
        Ok(selected)
    }
}

/// The standard stream set
pub fn build_streams(invoice_docparid: &str, order_docparid: &str) -> Vec<StreamDefinition> {
    let invoices = || Filter::equal("DOCPARID", invoice_docparid);
    let orders = || Filter::equal("DOCPARID", order_docparid);

    vec![
        StreamDefinition::new("gl_journals", "GLJOURNAL").full_refresh_only(),
        StreamDefinition::new("gl_batches", "GLBATCH"),
        StreamDefinition::new("gl_entries", "GLENTRY"),
        StreamDefinition::new("gl_detail", "GLDETAIL"),
        StreamDefinition::new("customers", "CUSTOMER"),
        StreamDefinition::new("ar_invoices", "ARINVOICE").with_child(
            StreamDefinition::new("ar_invoice_items", "ARINVOICEITEM").with_parent_key("RECORDKEY"),
        ),
        StreamDefinition::new("oe_invoices", "SODOCUMENT").with_filter(invoices()),
        StreamDefinition::new("oe_invoice_lines", "SODOCUMENTENTRY").with_filter(invoices()),
        StreamDefinition::new("orders", "SODOCUMENT").with_filter(orders()),
        StreamDefinition::new("order_lines", "SODOCUMENTENTRY").with_filter(orders()),
        StreamDefinition::new("subtotals", "SODOCUMENTSUBTOTALS").with_filter(invoices()),
        StreamDefinition::new("so_subtotals", "SODOCUMENTSUBTOTALS").with_filter(orders()),
    ]
}
