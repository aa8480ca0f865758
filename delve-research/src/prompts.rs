//! Prompt builders for every LLM step

use crate::types::{Learning, ResearchGoal};
use chrono::Utc;

/// Expert-researcher system prompt stamped with the current time
pub fn system_prompt() -> String {
    let now = Utc::now().to_rfc3339();
    format!(
        "You are an expert researcher. Today is {now}. Follow these instructions when responding:
- You may be asked to research subjects that are after your knowledge cutoff; assume the user is right when presented with news.
- The user is a highly experienced analyst, no need to simplify it, be as detailed as possible and make sure your response is correct.
- Be highly organized.
- Suggest solutions that I didn't think about.
- Be proactive and anticipate my needs.
- Treat me as an expert in all subject matter.
- Mistakes erode my trust, so be accurate and thorough.
- Provide detailed explanations, I'm comfortable with lots of detail.
- Value good arguments over authorities, the source is irrelevant.
- Consider new technologies and contrarian ideas, not just the conventional wisdom.
- You may use high levels of speculation or prediction, just flag it for me."
    )
}

pub fn plan_prompt(goal_context: &str, breadth: usize, existing_queries: &[String]) -> String {
    let mut prompt = format!(
        "Given the following prompt from the user, generate a list of web search queries to research the topic. \
Return a maximum of {breadth} queries, but feel free to return less if the original prompt is clear. \
Make sure each query is unique and not similar to each other:\n<prompt>{}</prompt>",
        goal_context.trim()
    );

    if !existing_queries.is_empty() {
        prompt.push_str(
            "\n\nThese queries have already been researched. Do not repeat them or close variants of them:\n<existing>\n",
        );
        for query in existing_queries {
            prompt.push_str(&format!("- {}\n", query));
        }
        prompt.push_str("</existing>");
    }

    prompt
}

pub fn extract_prompt(
    query: &str,
    content: &str,
    max_learnings: usize,
    max_follow_ups: usize,
) -> String {
    format!(
        "Given the following contents from a web search for the query <query>{query}</query>, \
extract a list of learnings from the contents. Return a maximum of {max_learnings} learnings, \
but feel free to return less if the contents are clear. Make sure each learning is unique and not similar to each other. \
Each learning must be a self-contained sentence that can be understood without the page. \
Be concise and information dense, and include entities like people, places, companies, products and things, \
as well as any exact metrics, numbers, or dates. \
Also return up to {max_follow_ups} follow-up search queries that would research the topic further.\n\
<content>\n{content}\n</content>"
    )
}

/// Child planning context built from one finished query
pub fn child_context(research_goal: &str, learnings: &[&Learning], follow_ups: &[String]) -> String {
    let mut context = format!("Previous research goal: {}\n", research_goal.trim());

    if !learnings.is_empty() {
        context.push_str("Learnings so far:\n");
        for learning in learnings {
            context.push_str(&format!("- {}\n", learning.text));
        }
    }

    if !follow_ups.is_empty() {
        context.push_str("Follow-up research directions:\n");
        for follow_up in follow_ups {
            context.push_str(&format!("- {}\n", follow_up));
        }
    }

    context
}

pub fn report_prompt(goal: &ResearchGoal, learnings: &[Learning]) -> String {
    let learnings_block = learnings
        .iter()
        .map(|l| format!("<learning>\n{}\n</learning>", l.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Given the following prompt from the user, write a final report on the topic using the learnings from research. \
Make it as detailed as possible, aim for 3 or more pages, include ALL the learnings from research. \
Write the report in Markdown.\n<prompt>{}</prompt>\n\n\
Here are all the learnings from research:\n<learnings>\n{}\n</learnings>",
        goal.prompt_text().trim(),
        learnings_block
    )
}

pub fn feedback_prompt(topic: &str, max_questions: usize) -> String {
    format!(
        "Given the following query from the user, ask follow-up questions to clarify the research direction. \
Return a maximum of {max_questions} questions, but feel free to return less if the original query is clear: \
<query>{}</query>",
        topic.trim()
    )
}
