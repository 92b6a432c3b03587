use super::error::Diagnostic;
use crate::engine::library::{resolve_detailed, Resolution};
use crate::project::BookProject;
use std::collections::HashMap;

fn block_location(page_index: usize, page_title: &str, block_id: &str) -> String {
    format!("page {} \"{}\" / block {}", page_index + 1, page_title, block_id)
}

/// 参照と資産コレクションの静的チェック（コードは実行しない）
pub fn run_lints(project: &BookProject) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let assets = &project.assets.simulators;

    // ブロック → 資産の参照チェック
    for (page_index, page) in project.pages.iter().enumerate() {
        for block in page.blocks.iter().filter(|b| b.is_simulator()) {
            let location = block_location(page_index, &page.title, &block.id);
            let Some(id) = block.simulator_id.as_deref().filter(|id| !id.is_empty()) else {
                diags.push(Diagnostic::warning("Simulator block has no simulatorId").at(location));
                continue;
            };
            match resolve_detailed(assets, id) {
                None => diags.push(
                    Diagnostic::warning(format!(
                        "Simulator '{}' is not in the project assets (renders a not-found notice)",
                        id
                    ))
                    .at(location),
                ),
                Some(Resolution::Alias(asset)) => diags.push(
                    Diagnostic::info(format!("Simulator '{}' resolved by legacy alias to '{}'", id, asset.id))
                        .at(location),
                ),
                Some(Resolution::Exact(_)) => {}
            }
        }
    }

    // 重複資産IDチェック
    let mut id_counts: HashMap<&str, usize> = HashMap::new();
    for asset in assets {
        *id_counts.entry(asset.id.as_str()).or_insert(0) += 1;
    }
    let mut duplicates: Vec<_> = id_counts.into_iter().filter(|(_, count)| *count > 1).collect();
    duplicates.sort();
    for (id, count) in duplicates {
        diags.push(
            Diagnostic::warning(format!(
                "Asset id '{}' appears {} times; the last one wins",
                id, count
            ))
            .at(format!("asset {}", id)),
        );
    }

    diags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::error::DiagnosticLevel;
    use crate::project::{ContentBlock, NodeType, Page, SimulatorAsset};

    fn asset(id: &str) -> SimulatorAsset {
        SimulatorAsset {
            id: id.to_string(),
            name: id.to_string(),
            code: "export default { init() {} };".to_string(),
            version: "1.0".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_reference_diagnostics() {
        let mut project = BookProject::new("L", "A");
        project.assets.simulators = vec![asset("bayes"), asset("sim_1")];
        let mut no_id = ContentBlock::simulator("");
        no_id.simulator_id = None;
        project.pages.push(Page {
            id: "p".into(),
            node_type: NodeType::Seccion,
            title: "T".into(),
            blocks: vec![
                ContentBlock::simulator("sim_1"),
                ContentBlock::simulator("legacy_bayes"),
                ContentBlock::simulator("legacy_missing123"),
                no_id,
            ],
        });

        let levels: Vec<DiagnosticLevel> = run_lints(&project).iter().map(|d| d.level).collect();
        assert_eq!(
            levels,
            vec![DiagnosticLevel::Info, DiagnosticLevel::Warning, DiagnosticLevel::Warning]
        );
        let diags = run_lints(&project);
        assert!(diags[1].message.contains("legacy_missing123"));
        assert!(diags[1].location.as_deref().unwrap().starts_with("page 1 \"T\""));
    }

    #[test]
    fn test_duplicate_asset_ids() {
        let mut project = BookProject::new("L", "A");
        project.assets.simulators = vec![asset("a"), asset("b"), asset("a")];

        let diags = run_lints(&project);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'a' appears 2 times"));
    }
}
