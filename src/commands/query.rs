//! Query command implementation

use crate::client::BackendClient;
use crate::error::Result;
use crate::models::{CitationKind, QueryResult};
use crate::stream::StreamingQueryClient;
use tracing::info;

/// Run a streaming query, forwarding each intermediate step to `on_step`.
pub async fn cmd_query(
    client: &BackendClient,
    collection_id: &str,
    question: &str,
    on_step: impl FnMut(&str),
) -> Result<QueryResult> {
    info!("Querying collection {}: {}", collection_id, question);
    let streaming = StreamingQueryClient::new(client.clone());
    let result = streaming.query(collection_id, question, on_step).await?;
    info!(
        "Answer received ({} citations)",
        result.citations.len()
    );
    Ok(result)
}

/// Print a query result to console
pub fn print_query_result(result: &QueryResult) {
    println!("\n{}\n", result.answer_text.trim());

    if result.citations.is_empty() {
        return;
    }

    println!("Sources:");
    for (i, citation) in result.citations.iter().enumerate() {
        let kind = match citation.kind {
            CitationKind::Text => "text",
            CitationKind::Graph => "graph",
        };
        let page = citation
            .page
            .map(|p| format!(", p.{}", p))
            .unwrap_or_default();
        let score = citation
            .relevance_score
            .map(|s| format!(" [score: {:.2}]", s))
            .unwrap_or_default();
        println!("{}. [{}] {}{}{}", i + 1, kind, citation.source_ref, page, score);

        let excerpt = citation.excerpt.trim();
        if !excerpt.is_empty() {
            let preview = if excerpt.chars().count() > 200 {
                let cut: String = excerpt.chars().take(200).collect();
                format!("{}...", cut.trim_end())
            } else {
                excerpt.to_string()
            };
            println!("   {}", preview.replace('\n', " "));
        }
    }
}
