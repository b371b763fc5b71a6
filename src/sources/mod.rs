use crate::model::CatalogEntry;
use anyhow::Result;

pub trait Source {
    fn scan(&self) -> Result<Vec<CatalogEntry>>;
}

pub mod games;
