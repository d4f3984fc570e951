use ledgerlink_sync::{CancelToken, FetchError, HledgerClient, LegacyHtmlParser, SyncConfig, parse_journal};
use ledgerlink_types::{Profile, ProfileId};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JOURNAL: &str = r#"<html><body>
<h1>Journal</h1>
<table class="balancereport">
; generated
<tr class="item"><td class="account"><a href="/register?q=inacct%3AAssets%3ACash" title="Show transactions">Assets:Cash</a></td>
<td class="amount"><span class="positive amount">1.234,56 EUR</span></td></tr>
<tr class="item"><td class="account"><a href="/register?q=inacct%3AExpenses%3AFood">Expenses:Food</a></td>
<td class="amount"><span class="negative amount">-12.50 USD</span><br><span class="positive amount">3,20 EUR</span></td></tr>
<tr class="item"><td class="account"><a href="/register?q=inacct%3AAssets%3ACash">Assets:Cash</a></td>
</table>
<h2>General Journal</h2>
<table class="journalreport">
<tr class="title" id="transaction-1"><td class="date">2026-01-05</td><td class="description">Groceries</td></tr>
<tr class="posting" title="2026-01-05 Groceries
    Expenses:Food    3,20 EUR
    Assets:Cash    -3,20 EUR

"><td></td></tr>
<tr class="title" id="transaction-2"><td class="date">2026-01-06</td><td class="description">Lunch</td></tr>
<tr class="posting" title="2026-01-06=2026-01-07 Lunch at the corner
  * Expenses:Food    $12.50
    Assets:Cash    $-12.50

"><td></td></tr>
<div class="modal" id="addmodal">
<tr class="title" id="transaction-9"><td class="date">2026-01-09</td></tr>
</body></html>
"#;

// ── Parsing ──────────────────────────────────────────────────────

#[test]
fn journal_yields_accounts_with_balances() {
    let result = parse_journal(JOURNAL, 0, |_, _| {}, || false).unwrap();

    let names: Vec<&str> = result.accounts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Assets:Cash", "Expenses:Food", "Assets", "Expenses"]);

    let cash = &result.accounts[0];
    assert_eq!(cash.amounts.len(), 1);
    assert_eq!(cash.amounts[0].amount, dec!(1234.56));
    assert_eq!(cash.amounts[0].currency, "EUR");

    let food = &result.accounts[1];
    assert_eq!(food.amounts[0].amount, dec!(-12.50));
    assert_eq!(food.amounts[0].currency, "USD");
    assert_eq!(food.amounts[1].amount, dec!(3.20));
}

#[test]
fn journal_yields_transactions_until_the_add_form() {
    let result = parse_journal(JOURNAL, 0, |_, _| {}, || false).unwrap();

    assert_eq!(result.transactions.len(), 2);
    let groceries = &result.transactions[0];
    assert_eq!(groceries.ledger_id, 1);
    assert_eq!(groceries.description, "Groceries");
    assert_eq!(groceries.postings[1].amount, Some(dec!(-3.20)));
    assert_eq!(groceries.postings[1].currency, "EUR");

    let lunch = &result.transactions[1];
    assert_eq!(lunch.date.to_string(), "2026-01-07");
    assert_eq!(lunch.description, "Lunch at the corner");
    assert_eq!(lunch.postings[0].account_name, "Expenses:Food");
    assert_eq!(lunch.postings[0].currency, "$");
}

#[test]
fn progress_counts_transactions_against_expected() {
    let mut reports = Vec::new();
    parse_journal(JOURNAL, 10, |current, total| reports.push((current, total)), || false).unwrap();
    assert_eq!(reports, vec![(1, 10), (2, 10)]);
}

#[test]
fn progress_is_silent_without_an_expected_count() {
    let mut reports = Vec::new();
    let result = parse_journal(JOURNAL, 0, |current, total| reports.push((current, total)), || false).unwrap();
    assert_eq!(result.transactions.len(), 2);
    assert!(reports.is_empty(), "got {reports:?}");
}

#[test]
fn grouped_amounts_parse_with_either_decimal_mark() {
    let page = "\
<a href=\"/register?q=inacct%3AAssets%3ABank\">Assets:Bank</a>
<span class=\"amount\">1,000.50 USD</span>
<h2>General Journal</h2>
<tr class=\"title\" id=\"transaction-1\"><td class=\"date\">2026-02-01</td></tr>
<tr class=\"posting\" title=\"2026-02-01 Rent
    Expenses:Rent    1.000,50 EUR
    Assets:Bank    -1,000.50 EUR

\"></tr>
";
    let result = parse_journal(page, 0, |_, _| {}, || false).unwrap();
    assert_eq!(result.accounts[0].amounts[0].amount, dec!(1000.50));
    let postings = &result.transactions[0].postings;
    assert_eq!(postings[0].amount, Some(dec!(1000.50)));
    assert_eq!(postings[1].amount, Some(dec!(-1000.50)));
}

#[test]
fn unparsable_detail_line_fails_the_parse() {
    let broken = JOURNAL.replace("    Assets:Cash    -3,20 EUR", "    Assets:Cash");
    let err = parse_journal(&broken, 0, |_, _| {}, || false).unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)), "got {err:?}");
}

#[test]
fn bad_date_fails_the_parse() {
    let broken = JOURNAL.replace("title=\"2026-01-05 Groceries", "title=\"2026-13-45 Groceries");
    assert!(parse_journal(&broken, 0, |_, _| {}, || false).is_err());
}

#[test]
fn cancellation_stops_the_scan() {
    let err = parse_journal(JOURNAL, 0, |_, _| {}, || true).unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));
}

// ── Fetching ─────────────────────────────────────────────────────

#[tokio::test]
async fn parser_fetches_the_journal_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/journal"))
        .respond_with(ResponseTemplate::new(200).set_body_string(JOURNAL))
        .expect(1)
        .mount(&server)
        .await;

    let client = HledgerClient::new(&SyncConfig::default()).unwrap();
    let profile = Profile::new(ProfileId::new(3), "old", format!("{}/", server.uri()));
    let result = LegacyHtmlParser::new(&client)
        .parse(&profile, 0, |_, _| {}, &CancelToken::default())
        .await
        .unwrap();

    assert_eq!(result.transactions.len(), 2);
}
