use crate::types::DataPointId;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Catalog entry describing one product: which data points a device of
/// this kind exposes, and in what polling order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data_points: Vec<DataPointId>,
}

/// Read-only product input, keyed by product id.
#[derive(Debug, Default, Clone)]
pub struct ProductCatalog {
    products: HashMap<u32, Product>,
}

impl ProductCatalog {
    pub fn insert(&mut self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn get(&self, id: u32) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Parse a catalog from the JSON array the products file carries.
pub fn parse_catalog(raw: &str) -> anyhow::Result<ProductCatalog> {
    let products: Vec<Product> = serde_json::from_str(raw).context("decoding product list")?;
    let mut catalog = ProductCatalog::default();
    for product in products {
        catalog.insert(product);
    }
    Ok(catalog)
}

pub fn load_catalog_file(path: impl AsRef<Path>) -> anyhow::Result<ProductCatalog> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading products file: {}", path.display()))?;
    parse_catalog(&raw).with_context(|| format!("parsing products file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_product_list() {
        let raw = r#"[
            { "id": 258, "name": "thermostat", "data_points": [1, 2] },
            { "id": 512, "data_points": [1] }
        ]"#;
        let catalog = parse_catalog(raw).unwrap();
        assert_eq!(catalog.len(), 2);
        let thermostat = catalog.get(258).unwrap();
        assert_eq!(thermostat.name.as_deref(), Some("thermostat"));
        assert_eq!(thermostat.data_points, vec![DataPointId(1), DataPointId(2)]);
        assert!(catalog.get(999).is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_catalog("{ not json").is_err());
    }
}
