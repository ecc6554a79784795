//! Basis set loading utilities

use crate::config::BasisLibraryParams;
use basis::{BasisRegistry, Harmonics};
use color_eyre::eyre::{eyre, Result, WrapErr};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const BSE_API: &str = "https://www.basissetexchange.org/api/basis";

/// A basis name and the elements it has to cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasisRequest {
    pub name: String,
    pub elements: BTreeSet<String>,
}

/// NWChem text for one element of `basis_name`: the local library first,
/// then Basis Set Exchange when remote fetching is enabled.
pub fn fetch_basis(basis_name: &str, symbol: &str, library: &BasisLibraryParams) -> Result<Option<String>> {
    if let Some(dir) = &library.dir {
        let local_path = Path::new(dir).join(format!(
            "{}.{}.nwchem",
            basis_name.to_lowercase(),
            symbol.to_lowercase()
        ));
        if local_path.exists() {
            debug!("Loading {} for {} from {}", basis_name, symbol, local_path.display());
            let text = fs::read_to_string(&local_path)
                .wrap_err_with(|| format!("Failed to read local basis set file: {}", local_path.display()))?;
            return Ok(Some(text));
        }
    }

    if !library.fetch_remote.unwrap_or(false) {
        return Ok(None);
    }

    let url = format!("{}/{}/format/nwchem?elements={}", BSE_API, basis_name, symbol);
    info!("Fetching {} for {} from {}", basis_name, symbol, url);
    let response = reqwest::blocking::get(&url)
        .and_then(|r| r.error_for_status())
        .wrap_err_with(|| format!("Failed to fetch basis set {} for {}", basis_name, symbol))?;
    let text = response
        .text()
        .wrap_err("Failed to get response text from basis set API")?;
    Ok(Some(text))
}

/// Build a registry holding every requested (basis, element) pair that can
/// be found. Pairs that cannot are reported and left out; the batch
/// pre-check turns them into unknown-basis errors.
pub fn load_registry(library: &BasisLibraryParams, requests: &[BasisRequest]) -> Result<BasisRegistry> {
    let harmonics = library.harmonics.unwrap_or(Harmonics::Spherical);
    let mut registry = BasisRegistry::new();

    for request in requests {
        if let Some(path) = library.files.as_ref().and_then(|files| files.get(&request.name)) {
            let text = fs::read_to_string(path)
                .wrap_err_with(|| format!("Unable to read basis file: {}", path))?;
            let count = registry
                .register_nwchem(&request.name, &text, harmonics)
                .map_err(|e| eyre!("{}: {}", path, e))?;
            info!("Loaded {} elements of {} from {}", count, request.name, path);
        }

        let known: BTreeSet<String> = registry
            .elements_for(&request.name)
            .into_iter()
            .map(str::to_string)
            .collect();
        for symbol in request.elements.difference(&known) {
            match fetch_basis(&request.name, symbol, library)? {
                Some(text) => {
                    registry
                        .register_nwchem(&request.name, &text, harmonics)
                        .map_err(|e| eyre!("basis {} for {}: {}", request.name, symbol, e))?;
                }
                None => warn!("No definition of basis {} found for {}", request.name, symbol),
            }
        }
    }
    Ok(registry)
}
