use anyhow::Context;
use std::path::{Path, PathBuf};

const FALLBACK_NAME: &str = "Strategy_Analysis";

/// `{product}_Report.md`, falling back to `Strategy_Analysis_Report.md`.
/// Characters that are not allowed in file names become `_`.
pub fn report_file_name(product_name: &str) -> String {
    let product = product_name.trim();
    let base = if product.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        product
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect()
    };
    format!("{}_Report.md", base)
}

/// Write a finished answer as Markdown into `dir` and return the file path.
pub fn write_report(dir: &Path, product_name: &str, content: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export dir {}", dir.display()))?;
    let path = dir.join(report_file_name(product_name));
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    log::info!("Report exported to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_reports_after_the_product() {
        assert_eq!(report_file_name("星途 ET"), "星途 ET_Report.md");
        assert_eq!(report_file_name("  "), "Strategy_Analysis_Report.md");
        assert_eq!(report_file_name("A/B: C"), "A_B_ C_Report.md");
    }

    #[test]
    fn writes_markdown_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), "ET", "# 报告\n").unwrap();
        assert_eq!(path.file_name().unwrap(), "ET_Report.md");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# 报告\n");
    }
}
