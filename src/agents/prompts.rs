// Prompt templates for the pipeline stages.
// Each template opens with its own bracketed heading; the heading doubles as
// the stage marker when prompts are inspected in logs and tests.

pub const INTENT_TAG: &str = "【意图识别】";
pub const DEPTH_TAG: &str = "【分析类型判断】";
pub const EXTRACTION_TAG: &str = "【数据提取改写】";
pub const PLOT_INSTRUCTION_TAG: &str = "【绘图指令提取】";
pub const TABLE_INSTRUCTION_TAG: &str = "【表格指令提取】";
pub const GUIDANCE_TAG: &str = "【分析指导】";
pub const REPORT_TAG: &str = "【分析报告】";
pub const COLUMN_DESCRIPTION_TAG: &str = "【字段说明】";

/// Appended to every extraction instruction so the query agent keeps
/// sibling columns of the matched rows.
pub const EXTRACTION_WIDENING: &str = "（返回匹配行的全部字段，不要只保留问题中提到的指标）";

/// Reply of the instruction extractors when the question has no such part
pub const NO_INSTRUCTION: &str = "NONE";

pub fn intent_prompt(question: &str) -> String {
    format!(
        r#"{INTENT_TAG}
判断用户的数据分析问题需要哪些输出形式，可以同时需要多种：
- plot：用户要求画图、折线图、柱状图、趋势图等可视化结果
- table：用户要求以表格形式列出、统计、计算一组结构化结果
- narrative：用户需要文字回答、解释、总结或原因分析

示例：
问题：请画出2025年3月到6月月均总收入的折线图
输出：plot
问题：计算下3到6月每个月的月均总收入，并画出柱状图
输出：plot, table
问题：分析下为什么20250601收入比20250501收入低
输出：narrative

只输出类别名称，多个类别用英文逗号分隔，不要输出其他内容。

问题：{question}"#
    )
}

pub fn depth_prompt(question: &str) -> String {
    format!(
        r#"{DEPTH_TAG}
判断用户问题属于哪一类：
- simple_lookup：直接查询或计算即可得到答案，例如"哪天总收入最高？"、"5月的总收入是多少"、"3到6月每个月的月均总收入"
- deep_analysis：需要比较、归因、趋势解释等多步分析，例如"分析下为什么6月1日收入比5月1日低"、"3月到6月收入变化的原因是什么"

只输出 simple_lookup 或 deep_analysis。

问题：{question}"#
    )
}

pub fn extraction_prompt(question: &str) -> String {
    format!(
        r#"{EXTRACTION_TAG}
把用户的分析问题改写为一条数据提取指令：提取问题中涉及的日期、产品、渠道等实体对应的全部数据，而不是只提取问题里点名的指标，后续分析需要用到相关的明细字段。

示例：
问题：分析下为什么20250601收入比20250501收入低
输出：提取日期为2025-06-01和2025-05-01的全部数据
问题：3月到6月App充值收入下降的原因是什么
输出：提取2025-03-01到2025-06-30之间的全部数据

如果输入已经是一条数据提取指令，原样输出。只输出改写后的指令。

问题：{question}"#
    )
}

pub fn plot_instruction_prompt(question: &str) -> String {
    format!(
        r#"{PLOT_INSTRUCTION_TAG}
从用户问题中只保留与绘图有关的部分，改写为一条完整的绘图指令，去掉表格、计算结果展示和文字分析的要求。
如果问题中没有任何绘图需求，只输出 {NO_INSTRUCTION}。

示例：
问题：计算下3到6月每个月的月均总收入，并画出折线图
输出：画出2025年3月到6月每个月月均总收入的折线图
问题：哪天总收入最高
输出：{NO_INSTRUCTION}

如果输入已经是一条绘图指令，原样输出。只输出指令本身。

问题：{question}"#
    )
}

pub fn table_instruction_prompt(question: &str) -> String {
    format!(
        r#"{TABLE_INSTRUCTION_TAG}
从用户问题中只保留需要以表格形式计算或展示的部分，改写为一条完整的表格查询指令，去掉绘图和文字分析的要求。
如果问题只要求绘图，只输出 {NO_INSTRUCTION}。

示例：
问题：计算下3到6月每个月的月均总收入，并画出折线图
输出：以表格列出2025年3月到6月每个月的月均总收入
问题：请画出3月到6月月均总收入的折线图
输出：{NO_INSTRUCTION}

如果输入已经是一条表格查询指令，原样输出。只输出指令本身。

问题：{question}"#
    )
}

pub fn guidance_prompt(question: &str, sample_rows: usize, sample_csv: &str) -> String {
    format!(
        r#"{GUIDANCE_TAG}
你是一名数据分析师。下面是用户的问题和已提取数据的前{sample_rows}行样例。
请给出简短的分析步骤：需要计算哪些指标、按什么顺序比较、重点关注哪些字段。用编号列表输出，不超过6步，不要给出结论。

问题：{question}

数据样例：
{sample_csv}"#
    )
}

pub fn report_prompt(question: &str, guidance: &str, row_count: usize, data_csv: &str) -> String {
    format!(
        r#"{REPORT_TAG}
你是一名资深数据分析师。请按照分析指导，基于提供的完整数据回答用户问题，输出 Markdown 格式的分析报告，包含以下部分：
## 分析摘要
## 核心洞察
## 详细分析
## 建议

所有结论必须来自数据，引用具体数值。

问题：{question}

分析指导：
{guidance}

数据（共{row_count}行）：
{data_csv}"#
    )
}

pub fn column_description_prompt(columns: &[String], sample_csv: &str) -> String {
    let columns = columns.join("、");
    format!(
        r#"{COLUMN_DESCRIPTION_TAG}
请用中文为数据集的每一列写一句简短说明，说明该列记录的是什么。
输出 JSON 数组，每个元素形如 {{"column": "列名", "description": "说明"}}，列名必须与给出的列名完全一致，不要输出其他内容。

列名：{columns}

数据样例：
{sample_csv}"#
    )
}

/// Query-agent instruction for the chart of one variable over time
pub fn variable_chart_instruction(variable: &str, date_column: Option<&str>) -> String {
    match date_column {
        Some(date) => format!("画出“{variable}”按“{date}”变化的折线图，横轴为“{date}”"),
        None => format!("画出“{variable}”按行顺序变化的柱状图"),
    }
}

/// Query-agent instruction for the trend narrative of one variable
pub fn variable_trend_instruction(variable: &str) -> String {
    format!("请用中文分析“{variable}”的趋势：整体走势、关键变化点、最高值和最低值出现的时间")
}
