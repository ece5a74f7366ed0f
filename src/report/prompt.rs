use chrono::NaiveDate;

pub const DATE_TOKEN: &str = "{today_date}";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Pre-open {today_date}, list 10 likely meme stocks today. \
Browse, cite, and rank by buzz + squeeze risk + fresh catalyst. Give a compact table: Ticker, \
pre-mkt move/vol, short interest %, days-to-cover, borrow fee/utilization, options vol & put/call, \
retail-mention trend, catalyst note, risk flags. Then 3 runners-up and 3 bullet \u{2018}watch items\u{2019} \
(levels/halts).";

/// Replaces every `{today_date}` with `date` as `YYYY-MM-DD`. Other braces
/// are left as written.
pub fn render(template: &str, date: NaiveDate) -> String {
    template.replace(DATE_TOKEN, &date.format("%Y-%m-%d").to_string())
}
