use crate::error::WorkerError;

/// Expands `$repo` and `$arch` in a mirror URL.
pub fn substitute_server(url: &str, repo: &str, arch: Option<&str>) -> Result<String, WorkerError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(WorkerError::InvalidServer {
            database: repo.to_string(),
            message: "empty server url".into(),
        });
    }

    let mut expanded = url.replace("$repo", repo);
    if expanded.contains("$arch") {
        let Some(arch) = arch.filter(|a| !a.is_empty()) else {
            return Err(WorkerError::InvalidServer {
                database: repo.to_string(),
                message: format!("{url} uses $arch but no architecture is configured"),
            });
        };
        expanded = expanded.replace("$arch", arch);
    }
    Ok(expanded)
}
