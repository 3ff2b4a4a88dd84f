//! Rendering of evidence and query history for the reasoning prompts.

use research_retrieval::EvidenceItem;

/// Placeholder when no evidence has been gathered.
pub const NO_CONTEXT: &str = "No context retrieved yet.";

/// Item and character limits for one rendered context block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Most recent items kept
    pub max_items: usize,

    /// Characters kept per item text before "..." is appended
    pub max_chars: usize,
}

impl ContextBudget {
    pub const QUERIES: ContextBudget = ContextBudget {
        max_items: 8,
        max_chars: 200,
    };

    pub const GRADE: ContextBudget = ContextBudget {
        max_items: 10,
        max_chars: 250,
    };

    pub const SYNTHESIS: ContextBudget = ContextBudget {
        max_items: 15,
        max_chars: 400,
    };
}

/// Token budget for evidence handed to the synthesis prompt.
pub const SYNTHESIS_TOKEN_BUDGET: usize = 6000;

/// Rough token estimate (4 characters per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Render evidence as numbered `[n] Text: ... / Source: f, Page: p` entries.
///
/// Keeps the last `budget.max_items` items and truncates each text.
pub fn format_context(items: &[EvidenceItem], budget: ContextBudget) -> String {
    if items.is_empty() {
        return NO_CONTEXT.to_string();
    }

    let start = items.len().saturating_sub(budget.max_items);
    items[start..]
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "[{}] Text: {}\nSource: {}, Page: {}",
                i + 1,
                truncate_chars(&item.text, budget.max_chars),
                item.filename,
                item.page_number
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Most recent items whose combined estimate fits `target_tokens`.
///
/// Always keeps at least one item when any exist. Order is preserved.
pub fn fit_to_token_budget(items: &[EvidenceItem], target_tokens: usize) -> &[EvidenceItem] {
    let mut used = 0;
    let mut start = items.len();
    for (i, item) in items.iter().enumerate().rev() {
        let cost = estimate_tokens(&item.text);
        if used + cost > target_tokens && start < items.len() {
            break;
        }
        used += cost;
        start = i;
    }
    &items[start..]
}

/// Bullet list of earlier queries, or "None".
pub fn format_previous_queries(queries: &[String]) -> String {
    if queries.is_empty() {
        return "None".to_string();
    }
    queries
        .iter()
        .map(|q| format!("- {}", q))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tidy generated queries.
///
/// Trims, drops blanks and in-list duplicates, cuts each query to
/// `max_length` characters and keeps at most `max_queries`. Queries that
/// repeat an earlier round are dropped unless nothing else would remain.
pub fn clean_queries(
    raw: Vec<String>,
    previous: &[String],
    max_queries: usize,
    max_length: usize,
) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for query in raw {
        let query: String = query.trim().chars().take(max_length).collect();
        let query = query.trim_end().to_string();
        if !query.is_empty() && !cleaned.contains(&query) {
            cleaned.push(query);
        }
    }

    let novel: Vec<String> = cleaned
        .iter()
        .filter(|q| !previous.contains(q))
        .cloned()
        .collect();
    let mut queries = if novel.is_empty() { cleaned } else { novel };
    queries.truncate(max_queries.max(1));
    queries
}

/// Cut `text` to `max_chars` characters, marking the cut with "...".
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}
