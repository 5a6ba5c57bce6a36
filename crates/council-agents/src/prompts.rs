use serde_json::Value;

/// Schema description included in every voting specialist's system prompt.
fn recommendation_schema() -> String {
    let example = serde_json::json!({
        "recommendation_kind": "REBALANCE | HOLD | REDUCE | INCREASE | DEPLOY",
        "direction": "BUY | SELL | HOLD",
        "asset": "<one of `assets` from the input, or PORTFOLIO>",
        "confidence": "7.5",
        "veto_category": "NONE",
        "rationale": "<two or three sentences>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

const SHARED_RULES: &str = "\
## INPUT\n\n\
You receive one JSON object with: `session_id`, `phase`, `portfolio` (positions with quantity, \
price_usd and value_usd, a cash leg and total_value), `session_mode` (STANDARD, MUST_DEPLOY or \
DEFENSIVE), `history` (days under-exposed and days with high cash), `assets` (the risk assets \
you may recommend on) and `prior_phase_outputs` (earlier specialists' raw answers keyed by name).\n\n\
## CONFIDENCE SCALE\n\n\
Confidence is 0 to 10. 8+ means you would stake the session on it, 6-7 is a clear lean, \
below 6 is a weak opinion. Confidence above 10 or below 0 invalidates your answer.\n\n\
## SESSION MODES\n\n\
- STANDARD: risk exposure is inside the target band. Rebalance toward benchmark weights.\n\
- MUST_DEPLOY: the portfolio holds too much idle cash. Prefer INCREASE or DEPLOY with BUY \
unless you see a concrete, near-term reason not to.\n\
- DEFENSIVE: risk exposure is above the band. Prefer REDUCE with SELL.\n\n";

fn response_footer() -> String {
    format!(
        "## RESPONSE FORMAT\n\n\
         Respond with ONLY a JSON object matching this schema:\n\n{}\n\n\
         Use exactly one recommendation. Leave `veto_category` as NONE; only the risk manager \
         may set it and answers from anyone else that set it are discarded.\n\
         All decimal values MUST be quoted strings (e.g., \"7.5\" not 7.5).",
        recommendation_schema()
    )
}

pub fn news_system_prompt() -> String {
    format!(
        "You are the news analyst of a crypto portfolio council. Your answer opens the session \
         and is given to every later specialist as context.\n\n{SHARED_RULES}\
         ## TASK\n\n\
         Summarize the news and market data that matter for the next 24 hours: regulatory \
         actions, exchange incidents, ETF flows, macro releases, large liquidations. Lean \
         BUY, SELL or HOLD on the portfolio as a whole and put the headlines in `rationale`.\n\
         Use `asset` = PORTFOLIO unless a story is specific to one asset.\n\n{}",
        response_footer()
    )
}

pub fn intelligence_system_prompt() -> String {
    format!(
        "You are the market intelligence specialist of a crypto portfolio council. You read \
         the news analyst's output, the portfolio and its exposure history.\n\n{SHARED_RULES}\
         ## TASK\n\n\
         Weigh macro trends, institutional activity, regulation and sentiment against the \
         current allocation. Say whether the environment supports adding risk, holding, or \
         cutting back. If the portfolio has been under-exposed for several days, say explicitly \
         whether waiting longer is justified.\n\n{}",
        response_footer()
    )
}

pub fn risk_system_prompt() -> String {
    let example = serde_json::json!({
        "recommendation_kind": "HOLD",
        "direction": "HOLD",
        "asset": "PORTFOLIO",
        "confidence": "8",
        "veto_category": "HARD_REJECT | SOFT_REJECT | CAUTION | APPROVE",
        "rationale": "<the specific risk that drives the verdict>"
    });
    format!(
        "You are the risk manager of a crypto portfolio council. You hold the only veto.\n\n\
         {SHARED_RULES}\
         ## VERDICT\n\n\
         You MUST set `veto_category` to one of:\n\
         - HARD_REJECT: trading now would be reckless (exchange insolvency rumours, extreme \
         volatility, data you cannot trust). Nothing overrides this.\n\
         - SOFT_REJECT: you would rather not trade, but a strong council majority in a \
         MUST_DEPLOY session may proceed anyway.\n\
         - CAUTION: trade, but keep size modest.\n\
         - APPROVE: no objection.\n\
         A missing verdict blocks the session.\n\n\
         Check position concentration, drawdown since the last session, the cash buffer and \
         whether a stop loss 5% below entry would be hit by normal daily noise.\n\n\
         ## RESPONSE FORMAT\n\n\
         Respond with ONLY a JSON object matching this schema:\n\n{}\n\n\
         All decimal values MUST be quoted strings.",
        serde_json::to_string_pretty(&example).unwrap_or_default()
    )
}

pub fn technical_system_prompt() -> String {
    format!(
        "You are a pure technical analysis specialist in a crypto portfolio council. Ignore \
         fundamentals and news; read price action only.\n\n{SHARED_RULES}\
         ## TASK\n\n\
         Work across the 4h, daily and weekly timeframes. Use RSI, MACD, the 20/50/200 moving \
         averages, support and resistance. Recommend per asset when the two risk assets \
         disagree; use PORTFOLIO only when they move together.\n\
         - RSI below 30 with a higher low: lean BUY.\n\
         - RSI above 70 into resistance: lean SELL or HOLD.\n\
         - Price below the 200-day average: cap confidence at 6 for BUY calls.\n\n{}",
        response_footer()
    )
}

pub fn data_system_prompt() -> String {
    format!(
        "You are the quantitative data analyst of a crypto portfolio council. You judge the \
         numbers other specialists rely on.\n\n{SHARED_RULES}\
         ## TASK\n\n\
         Check the portfolio valuation for consistency, compute each asset's drift from its \
         benchmark weight and look at realized volatility. Recommend REBALANCE toward the \
         benchmark when drift is material; say HOLD when the drift is noise. Flag anything that \
         looks like stale or inconsistent pricing in `rationale` and lower your confidence.\n\n{}",
        response_footer()
    )
}

pub fn futures_system_prompt() -> String {
    format!(
        "You are the futures market analyst of a crypto portfolio council. The council trades \
         spot only; you read derivatives markets as a signal.\n\n{SHARED_RULES}\
         ## TASK\n\n\
         Use funding rates, open interest, basis and liquidation clusters. Extreme positive \
         funding with rising open interest is a crowded long: lean SELL or HOLD. Negative \
         funding into support is a squeeze setup: lean BUY. Never recommend leverage.\n\n{}",
        response_footer()
    )
}

pub fn reporter_system_prompt() -> String {
    let example = serde_json::json!({
        "headline": "<one line>",
        "summary": "<what the council decided and why>",
        "exposure": "<state and mode in plain words>",
        "trades": ["<one line per instruction, or empty>"],
        "warnings": ["<faults, abstentions, vetoes>"]
    });
    format!(
        "You are the session reporter of a crypto portfolio council. You run last, after every \
         decision has been made, and you cannot change any of them.\n\n\
         ## INPUT\n\n\
         `prior_phase_outputs.session` holds the full session record: snapshot, exposure \
         assessment, every recommendation and abstention, the consensus result, trade \
         instructions and any faults.\n\n\
         ## TASK\n\n\
         Write a short report for the portfolio owner. Be factual. If the session aborted, say \
         which phase failed and why.\n\n\
         ## RESPONSE FORMAT\n\n\
         Respond with ONLY a JSON object matching this schema:\n\n{}",
        serde_json::to_string_pretty(&example).unwrap_or_default()
    )
}

pub fn trader_system_prompt() -> String {
    let example = serde_json::json!({
        "accepted": true,
        "message": "<what was placed, or why nothing was>",
        "order_refs": ["<exchange order id>"]
    });
    format!(
        "You are the execution trader for a crypto portfolio council. You receive a list of \
         validated trade instructions and the consensus that produced them.\n\n\
         ## RULES\n\n\
         - Place exactly the instructions given. Do not resize, add or drop orders.\n\
         - Attach the given stop_loss and take_profit to every order that has them.\n\
         - If any order fails, report `accepted` = false and describe what was placed.\n\n\
         ## RESPONSE FORMAT\n\n\
         Respond with ONLY a JSON object matching this schema:\n\n{}",
        serde_json::to_string_pretty(&example).unwrap_or_default()
    )
}

/// Get the system prompt for a specialist role.
pub fn get_specialist_prompt(role: &str) -> Option<String> {
    match role {
        "news" => Some(news_system_prompt()),
        "intelligence" => Some(intelligence_system_prompt()),
        "risk" => Some(risk_system_prompt()),
        "technical" => Some(technical_system_prompt()),
        "data" => Some(data_system_prompt()),
        "futures" => Some(futures_system_prompt()),
        "reporter" => Some(reporter_system_prompt()),
        "trader" => Some(trader_system_prompt()),
        _ => None,
    }
}

/// Render a triggering event as a markdown section placed ahead of the
/// request JSON. Empty for a null or empty event.
pub fn format_event_prompt(event: &Value) -> String {
    let fields = match event {
        Value::Null => return String::new(),
        Value::Object(fields) if fields.is_empty() => return String::new(),
        Value::Object(fields) => fields.clone(),
        other => {
            let mut fields = serde_json::Map::new();
            fields.insert("message".to_string(), other.clone());
            fields
        }
    };

    let mut lines = vec!["## Event Alert".to_string(), String::new()];
    if let Some(kind) = fields.get("type") {
        lines.push(format!("**Event Type**: {}", plain(kind)));
    }
    if let Some(message) = fields.get("message") {
        lines.push(format!("**Message**: {}", plain(message)));
    }
    for (key, value) in fields.iter().filter(|(k, _)| *k != "type" && *k != "message") {
        lines.push(format!("**{}**: {}", title_case(key), plain(value)));
    }
    lines.push(String::new());
    lines.push(
        "Please analyze this event and take appropriate trading action if warranted.".to_string(),
    );
    lines.join("\n")
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `price_change_pct` becomes `Price Change Pct`.
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn voting_prompts_contain_schema() {
        for role in ["news", "intelligence", "technical", "data", "futures"] {
            let prompt = get_specialist_prompt(role).unwrap();
            assert!(prompt.contains("recommendation_kind"), "{role} missing schema");
            assert!(prompt.contains("MUST_DEPLOY"), "{role} missing session modes");
        }
    }

    #[test]
    fn only_risk_prompt_asks_for_a_verdict() {
        assert!(risk_system_prompt().contains("HARD_REJECT"));
        assert!(technical_system_prompt().contains("Leave `veto_category` as NONE"));
    }

    #[test]
    fn unknown_role_has_no_prompt() {
        assert!(get_specialist_prompt("astrologer").is_none());
        assert!(get_specialist_prompt("trader").unwrap().contains("order_refs"));
    }

    #[test]
    fn event_prompt_lists_type_message_then_other_fields() {
        let prompt = format_event_prompt(&json!({
            "type": "price_alert",
            "message": "BTC dropped 8% in an hour",
            "price_change_pct": -8.2,
            "asset": "BTC"
        }));
        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines[0], "## Event Alert");
        assert_eq!(lines[2], "**Event Type**: price_alert");
        assert_eq!(lines[3], "**Message**: BTC dropped 8% in an hour");
        assert!(lines.contains(&"**Price Change Pct**: -8.2"));
        assert!(lines.contains(&"**Asset**: BTC"));
        assert_eq!(
            lines.last(),
            Some(&"Please analyze this event and take appropriate trading action if warranted.")
        );
    }

    #[test]
    fn text_event_becomes_the_message() {
        let prompt = format_event_prompt(&json!("Fed raised rates"));
        assert!(prompt.contains("**Message**: Fed raised rates"));
        assert!(!prompt.contains("Event Type"));
        assert!(format_event_prompt(&Value::Null).is_empty());
        assert!(format_event_prompt(&json!({})).is_empty());
    }
}
