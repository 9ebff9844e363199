//! 标记提取协作方 - 纯函数
//!
//! 对已经解析好的文档做单次数据变换，不持有任何状态，
//! 也不参与核心的调度流程。调用方一般在回调里使用这些工具。

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::warn;

/// 提取两个同级节点之间的兄弟节点，拼成一段新的 HTML 文本
///
/// # 参数
/// - `parent`: 包含起止节点的父元素
/// - `start_selector`: 起始节点选择器，None 表示从第一个子节点开始
/// - `end_selector`: 结束节点选择器，None 表示取到最后一个子节点
/// - `include_start`: 是否包含起始节点本身
/// - `include_end`: 是否包含结束节点本身
///
/// # 返回
/// 起止之间没有兄弟节点、起止节点不是 `parent` 的直接子节点、
/// 或起止选择器都为 None 时返回 None。
pub fn html_between_siblings(
    parent: ElementRef<'_>,
    start_selector: Option<&str>,
    end_selector: Option<&str>,
    include_start: bool,
    include_end: bool,
) -> Option<String> {
    if start_selector.is_none() && end_selector.is_none() {
        warn!("起止选择器不能同时为空");
        return None;
    }

    let children: Vec<_> = parent.children().collect();

    let mut start_index = match start_selector {
        Some(selector) => child_position(parent, &children, selector)? + 1,
        None => 0,
    };
    let mut end_index = match end_selector {
        Some(selector) => child_position(parent, &children, selector)?,
        None => children.len(),
    };

    // 端点节点本身按需并入范围
    let mut endpoint_count = 0;
    if include_start && start_selector.is_some() {
        endpoint_count += 1;
        start_index -= 1;
    }
    if include_end && end_selector.is_some() {
        endpoint_count += 1;
        end_index += 1;
    }

    if start_index >= end_index {
        return None;
    }
    let between = &children[start_index..end_index.min(children.len())];
    if between.len() == endpoint_count {
        warn!("起止节点之间没有兄弟节点");
        return None;
    }

    Some(between.iter().map(|node| node_html(*node)).collect())
}

/// 找到选择器命中的第一个节点在直接子节点里的下标
///
/// 命中的节点必须是 `parent` 的直接子节点（同级约束），否则返回 None。
fn child_position(
    parent: ElementRef<'_>,
    children: &[NodeRef<'_, Node>],
    selector: &str,
) -> Option<usize> {
    let selector = Selector::parse(selector).ok()?;
    let found = parent.select(&selector).next()?;
    let position = children.iter().position(|child| child.id() == found.id());
    if position.is_none() {
        warn!("选择器命中的节点不是直接子节点");
    }
    position
}

/// 序列化单个节点（元素或文本）
fn node_html(node: NodeRef<'_, Node>) -> String {
    if let Some(element) = ElementRef::wrap(node) {
        element.html()
    } else if let Some(text) = node.value().as_text() {
        text.to_string()
    } else {
        String::new()
    }
}

/// 提取标准 table 元素的数据（最多一行表头）
///
/// 表头取 `thead` 第一行的 `th` 文本，数据行取 `tbody` 每行的 `td` 文本，
/// 所有单元格去掉首尾空白。没有对应部分时跳过，不报错。
pub fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    let mut rows = Vec::new();

    if let (Ok(thead_tr), Ok(th)) = (Selector::parse("thead tr"), Selector::parse("th")) {
        if let Some(header_row) = table.select(&thead_tr).next() {
            let header: Vec<String> = header_row.select(&th).map(cell_text).collect();
            rows.push(header);
        }
    }

    if let (Ok(tbody_tr), Ok(td)) = (Selector::parse("tbody tr"), Selector::parse("td")) {
        for tr in table.select(&tbody_tr) {
            rows.push(tr.select(&td).map(cell_text).collect());
        }
    }

    rows
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// 在整个文档里找到第一个 table 并提取数据，找不到返回空
pub fn first_table_rows(document: &Html) -> Vec<Vec<String>> {
    let Ok(table_selector) = Selector::parse("table") else {
        return Vec::new();
    };
    document
        .select(&table_selector)
        .next()
        .map(table_rows)
        .unwrap_or_default()
}
