use serde::{Deserialize, Serialize};

/// Product and competitor inputs collected by the wizard's form step.
/// Every field is free text; blanks render as empty strings in the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyForm {
    pub product_name: String,
    pub product_type: String,
    pub price_range: String,
    pub actual_price: String,
    pub launch_date: String,
    pub data_cutoff: String,
    pub sales_target: String,
    pub core_selling_points: String,
    pub cockpit_system: String,
    pub smart_driving_system: String,
    pub energy_type: String,
    pub market_segment: String,

    /// Positioning benchmarks.
    pub comp1: String,
    pub comp2: String,
    /// Price-overlap competitors.
    pub price_comp1: String,
    pub price_comp2: String,
    pub price_comp3: String,
    pub price_comp4: String,
    /// High-price benchmarks.
    pub high_price1: String,
    pub high_price2: String,
}

impl StrategyForm {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Names of the core product fields that are still blank.
    pub fn missing_core_fields(&self) -> Vec<&'static str> {
        [
            ("productName", &self.product_name),
            ("productType", &self.product_type),
            ("marketSegment", &self.market_segment),
            ("comp1", &self.comp1),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Render the "five looks, three decisions" deep-research prompt that seeds the
/// conversation as its first user message.
pub fn generate_strategy_prompt(form: &StrategyForm) -> String {
    let f = form;
    format!(
        r#"
**致 AI 战略分析师 (Deep Research Mode)：**

您是一个由行业分析专家、数据科学家和产品策略师组成的精英团队。您的任务是针对 **{product}** 执行深度的"五看三定"战略分析。

**【重要指令：思维链与研究日志】**
在正式输出报告之前，您必须进行深度的逻辑推演。请在 `reasoning_content` (思考过程) 中输出您的研究步骤。
为了让用户看到您的工作过程，请在思考过程中使用以下日志格式（每行一个步骤）：
> [Data Check] 检查输入数据的完整性...
> [Gap Analysis] 发现缺少竞品X的详细配置...
> [Search] 联网搜索 {product} 的最新车主口碑...
> [Analysis] 对比 {comp1} 的定价策略...

---

# 【第一阶段】：通用化七步战略分析

## 1. 看市场 (Market Analysis)
*   **聚焦：** **{segment}** 价格区间、**{energy}** **{ptype}** 细分市场。
*   **任务：** 分析截至 **{cutoff}** 的市场容量、增长率及 Top 5 格局。

## 2. 看用户 (User Persona & Scenarios)
*   **任务1 (画像偏差)：** 对比基于 **{selling}** 的"理想用户"与实际社交媒体/论坛数据的"真实用户"。
*   **任务2 (竞品对比)：** 为什么用户买了 **{comp1}** 或 **{comp2}** 而没买我们？(Jobs-to-be-Done)。
*   **任务3 (痛点挖掘)：** 重点挖掘 **{cockpit}** 和 **{driving}** 的真实用户吐槽。

## 3. 看竞争 (Competitor Analysis)
*   **对手：** 核心竞品 (**{comp1}, {comp2}**), 价格重叠 (**{pc1}, {pc2}**), 高价位标杆 (**{hp1}, {hp2}**)。
*   **分析：**
    1.  标杆的"护城河"是什么？(非功能性的品牌/渠道/认知优势)。
    2.  价格杀手 (**{pc2}**) 是如何做到极致成本控制的？

## 4. 看自我 (Self Analysis)
*   **Win/Loss 分析：** 基于 **{launch}** 至今的表现。
    *   Wins: 促成交易的 Top 3 因素。
    *   Losses: 导致战败的 Top 3 因素。
    *   **交叉验证：** 如果主打 **{driving}** 但选装率低，说明了什么战略错配？

## 5. 看技术 (Tech Trends)
*   未来2年能形成"代差"的技术，特别是针对 **{energy}** 的架构优化、端到端智驾、以及AI座舱。

---

# 【第二阶段】：综合战略交付成果

## 1. 核心战略裁判
*   **{product}** 当前的 **{price}** 是"降维打击"还是"错位竞争"？
*   要实现 **{target}**，必须坚守的价值底线是什么？

## 2. "Beat-Them" 竞品打击卡
请生成表格：
| 竞品 | 核心优势 (护城河) | 我们的"打赢"产品策略 | 我们的"打赢"定价/权益策略 | 我们的"打赢"传播话术 |
| :--- | :--- | :--- | :--- | :--- |
| **{comp1}** | ... | ... | ... | ... |
| **{comp2}** | ... | ... | ... | ... |
| **{pc1}**| ... | ... | ... | ... |

## 3. 路线图 (Roadmap)
*   **MY202x (改款)：** 针对 Win/Loss 的快速修正（配置增减、权益调整）。
*   **下一代定义：** 针对技术趋势的主动布局（换代方向）。

---

请生成一份结构清晰、Markdown 格式的深度战略分析报告。确保数据翔实，观点犀利。
"#,
        product = f.product_name,
        ptype = f.product_type,
        price = f.actual_price,
        launch = f.launch_date,
        cutoff = f.data_cutoff,
        target = f.sales_target,
        selling = f.core_selling_points,
        cockpit = f.cockpit_system,
        driving = f.smart_driving_system,
        energy = f.energy_type,
        segment = f.market_segment,
        comp1 = f.comp1,
        comp2 = f.comp2,
        pc1 = f.price_comp1,
        pc2 = f.price_comp2,
        hp1 = f.high_price1,
        hp2 = f.high_price2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StrategyForm {
        StrategyForm {
            product_name: "星途 ET".to_string(),
            product_type: "SUV".to_string(),
            energy_type: "增程".to_string(),
            market_segment: "20-25万".to_string(),
            comp1: "理想 L6".to_string(),
            comp2: "问界 M7".to_string(),
            price_comp2: "零跑 C16".to_string(),
            sales_target: "月销 5000".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn fills_fields_into_template() {
        let prompt = generate_strategy_prompt(&sample());
        assert!(prompt.contains("针对 **星途 ET** 执行深度"));
        assert!(prompt.contains("**20-25万** 价格区间、**增程** **SUV** 细分市场"));
        assert!(prompt.contains("价格杀手 (**零跑 C16**)"));
        assert!(prompt.contains("| **理想 L6** |"));
        assert!(prompt.contains("要实现 **月销 5000**"));
        assert!(prompt.contains("> [Search] 联网搜索 星途 ET 的最新车主口碑"));
    }

    #[test]
    fn blank_fields_render_empty() {
        let prompt = generate_strategy_prompt(&StrategyForm::default());
        assert!(prompt.contains("针对 **** 执行深度"));
        assert!(!prompt.contains("{product}"));
    }

    #[test]
    fn unused_form_fields_stay_out_of_the_prompt() {
        let form = StrategyForm {
            price_range: "RANGE_X".to_string(),
            price_comp3: "PC3_X".to_string(),
            price_comp4: "PC4_X".to_string(),
            ..sample()
        };
        let prompt = generate_strategy_prompt(&form);
        assert!(!prompt.contains("RANGE_X"));
        assert!(!prompt.contains("PC3_X"));
        assert!(!prompt.contains("PC4_X"));
        assert!(prompt.contains("价格重叠 (**, 零跑 C16**)"));
        assert!(prompt.contains("基于 **** 至今的表现。"));
    }

    #[test]
    fn reads_partial_form_json() {
        let form = StrategyForm::from_json(
            r#"{"productName":"ET","priceComp3":"X","unknownField":1}"#,
        )
        .unwrap();
        assert_eq!(form.product_name, "ET");
        assert_eq!(form.price_comp3, "X");
        assert!(form.comp1.is_empty());
    }

    #[test]
    fn reports_missing_core_fields() {
        let mut form = sample();
        assert!(form.missing_core_fields().is_empty());
        form.comp1 = " ".to_string();
        form.product_name.clear();
        assert_eq!(form.missing_core_fields(), vec!["productName", "comp1"]);
    }
}
