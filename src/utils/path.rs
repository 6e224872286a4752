//! Remote path helpers

/// Splits a remote path into its directory components, dropping leading,
/// trailing and repeated separators.
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}
