use anyhow::Result;
use tracing::info;

use crate::llm::Oracle;
use crate::rag::answer_question;
use crate::store::SearchIndex;

pub async fn ask(oracle: &dyn Oracle, index: &dyn SearchIndex, question: &str, top: usize) -> Result<()> {
    info!(question, top, "Question received");
    let answer = answer_question(oracle, index, question, top).await?;
    println!("{}", answer);
    Ok(())
}
