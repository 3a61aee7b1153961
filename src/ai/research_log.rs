use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static BULLETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[>*\- ]+").unwrap());
static STEP_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[(Search|Analysis|Gap Analysis|Data Check|Gap|Competitor|Market|Tech|Data Synthesis|User Insight|Self Diagnosis|Strategic Positioning|Value Bottom Line|Roadmap Logic|Tech Trend Mapping|Competitor Deep Dive)\]:?",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StepKind {
    Search,
    Analysis,
    Check,
    Note,
}

impl StepKind {
    fn classify(line: &str) -> Self {
        let lower = line.to_lowercase();
        if lower.contains("search") || lower.contains("搜索") {
            StepKind::Search
        } else if lower.contains("analysis") || lower.contains("分析") || lower.contains("thinking")
        {
            StepKind::Analysis
        } else if lower.contains("check") || lower.contains("检查") {
            StepKind::Check
        } else {
            StepKind::Note
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            StepKind::Search => "🔍",
            StepKind::Analysis => "🧠",
            StepKind::Check => "📋",
            StepKind::Note => "✓",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResearchStep {
    pub kind: StepKind,
    pub text: String,
}

/// Split accumulated reasoning into research-log steps. The model is asked to
/// write lines like `> [Search] ...`; bullets and known tags are stripped after
/// the line has been classified.
pub fn parse_steps(reasoning: &str) -> Vec<ResearchStep> {
    reasoning
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let kind = StepKind::classify(line);
            let without_bullets = BULLETS.replace(line, "");
            let text = STEP_TAG.replace(&without_bullets, "").trim().to_string();
            ResearchStep { kind, text }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_and_cleans_lines() {
        let log = "> [Data Check] 检查输入数据的完整性...\n\n\
                   > [Search] 联网搜索 车主口碑\n\
                   - [Gap Analysis]: 发现缺少竞品X的详细配置\n\
                   plain note\n";
        let steps = parse_steps(log);
        assert_eq!(
            steps,
            vec![
                ResearchStep {
                    kind: StepKind::Check,
                    text: "检查输入数据的完整性...".to_string()
                },
                ResearchStep {
                    kind: StepKind::Search,
                    text: "联网搜索 车主口碑".to_string()
                },
                ResearchStep {
                    kind: StepKind::Analysis,
                    text: "发现缺少竞品X的详细配置".to_string()
                },
                ResearchStep {
                    kind: StepKind::Note,
                    text: "plain note".to_string()
                },
            ]
        );
    }

    #[test]
    fn search_wins_over_analysis() {
        let steps = parse_steps("Thinking about what to SEARCH next");
        assert_eq!(steps[0].kind, StepKind::Search);
    }

    #[test]
    fn unknown_tags_are_kept() {
        let steps = parse_steps("> [Pricing] 对比定价");
        assert_eq!(steps[0].text, "[Pricing] 对比定价");
        assert_eq!(steps[0].kind, StepKind::Note);
    }

    #[test]
    fn blank_reasoning_has_no_steps() {
        assert!(parse_steps("  \n\n").is_empty());
    }
}
