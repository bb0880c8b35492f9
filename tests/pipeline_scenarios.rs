//! End-to-end runs against a mock E-utilities server.

use get_papers_list::config::Settings;
use get_papers_list::filter::AffiliationFilter;
use get_papers_list::output::{self, Destination, OutputFormat};
use get_papers_list::pipeline;
use get_papers_list::pubmed::PubmedClient;
use get_papers_list::PapersError;
use mockito::{Matcher, Server, ServerGuard};
use std::collections::BTreeSet;
use std::time::Duration;

const INDUSTRY: &str = "XYZ Pharmaceuticals Inc., Cambridge, MA, USA.";
const ACADEMIC: &str = "Department of Immunology, University of Oxford, Oxford, UK.";

fn settings_for(server: &ServerGuard) -> Settings {
    let mut settings = Settings::default();
    settings.http.base_url = server.url();
    settings.http.max_retries = 2;
    settings.http.initial_backoff_ms = 1;
    settings
}

fn client_for(settings: &Settings) -> PubmedClient {
    PubmedClient::from_settings(settings)
        .unwrap()
        .with_request_interval(Duration::ZERO)
}

fn esearch_body(ids: &[&str], count: usize) -> String {
    let ids: Vec<String> = ids.iter().map(|id| format!("\"{}\"", id)).collect();
    format!(
        r#"{{"header":{{"type":"esearch","version":"0.3"}},"esearchresult":{{"count":"{}","retmax":"{}","retstart":"0","idlist":[{}]}}}}"#,
        count,
        ids.len(),
        ids.join(",")
    )
}

fn article(pmid: &str, affiliation: &str) -> String {
    format!(
        r#"<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">{pmid}</PMID>
    <Article PubModel="Print">
      <Journal><JournalIssue><PubDate><Year>2024</Year><Month>Feb</Month></PubDate></JournalIssue></Journal>
      <ArticleTitle>Immunotherapy study {pmid}</ArticleTitle>
      <AuthorList CompleteYN="Y">
        <Author ValidYN="Y">
          <LastName>Author{pmid}</LastName>
          <ForeName>Test</ForeName>
          <AffiliationInfo><Affiliation>{affiliation}</Affiliation></AffiliationInfo>
        </Author>
      </AuthorList>
    </Article>
  </MedlineCitation>
</PubmedArticle>"#
    )
}

fn article_set(articles: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" ?>\n<PubmedArticleSet>\n{}\n</PubmedArticleSet>",
        articles.join("\n")
    )
}

async fn mock_search(server: &mut ServerGuard, ids: &[&str]) -> mockito::Mock {
    server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::UrlEncoded("db".into(), "pubmed".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(esearch_body(ids, ids.len()))
        .create_async()
        .await
}

async fn mock_fetch(server: &mut ServerGuard, id_param: &str, body: String) -> mockito::Mock {
    server
        .mock("POST", "/efetch.fcgi")
        .match_query(Matcher::Any)
        .match_body(Matcher::UrlEncoded("id".into(), id_param.into()))
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(body)
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn test_two_of_five_industry_papers_are_written() {
    let mut server = Server::new_async().await;
    let ids = ["1001", "1002", "1003", "1004", "1005"];
    let search = mock_search(&mut server, &ids).await;

    let articles = vec![
        article("1001", ACADEMIC),
        article("1002", INDUSTRY),
        article("1003", ACADEMIC),
        article("1004", INDUSTRY),
        article("1005", ACADEMIC),
    ];
    let fetch = mock_fetch(&mut server, "1001,1002,1003,1004,1005", article_set(&articles)).await;

    let settings = settings_for(&server);
    let client = client_for(&settings);
    let filter = AffiliationFilter::new(&settings.filter).unwrap();

    let report = pipeline::run(&client, &filter, "cancer immunotherapy", 5)
        .await
        .unwrap();

    search.assert_async().await;
    fetch.assert_async().await;
    assert_eq!(report.total_ids, 5);
    assert_eq!(report.parsed, 5);
    assert!(!report.is_partial());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.csv");
    output::write(&report.results, &Destination::File(path.clone()), OutputFormat::Csv).unwrap();

    let written: BTreeSet<String> = output::read_ids(&path).unwrap().into_iter().collect();
    let expected: BTreeSet<String> = ["1002", "1004"].iter().map(|s| s.to_string()).collect();
    assert_eq!(written, expected);

    let csv = std::fs::read_to_string(&path).unwrap();
    assert!(csv.contains("Test Author1002"));
    assert!(csv.contains("2024-02"));
}

#[tokio::test]
async fn test_zero_ids_is_not_found() {
    let mut server = Server::new_async().await;
    let search = mock_search(&mut server, &[]).await;
    let fetch = server
        .mock("POST", "/efetch.fcgi")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let settings = settings_for(&server);
    let client = client_for(&settings);
    let filter = AffiliationFilter::new(&settings.filter).unwrap();

    let err = pipeline::run(&client, &filter, "nothing matches this", 5)
        .await
        .unwrap_err();

    assert!(matches!(err, PapersError::NotFound(_)));
    assert!(err.to_string().contains("No results found"));
    search.assert_async().await;
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_malformed_detail_fetch_skips_only_that_paper() {
    let mut server = Server::new_async().await;
    let ids = ["2001", "2002", "2003", "2004", "2005"];
    let _search = mock_search(&mut server, &ids).await;

    let mut fetches = Vec::new();
    for id in ids {
        let body = if id == "2003" {
            "<PubmedArticleSet><PubmedArticle><MedlineCitation><PMID>2003</PMID>".to_string()
        } else {
            article_set(&[article(id, INDUSTRY)])
        };
        fetches.push(mock_fetch(&mut server, id, body).await);
    }

    let mut settings = settings_for(&server);
    settings.search.batch_size = 1;
    settings.search.concurrency = 1;
    let client = client_for(&settings);
    let filter = AffiliationFilter::new(&settings.filter).unwrap();

    let report = pipeline::run(&client, &filter, "cancer immunotherapy", 5)
        .await
        .unwrap();

    for fetch in &fetches {
        fetch.assert_async().await;
    }
    assert_eq!(report.parsed, 4);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, "2003");
    assert!(report.skipped[0].reason.contains("Malformed"));

    let kept: Vec<&str> = report.results.iter().map(|r| r.paper.id.as_str()).collect();
    assert_eq!(kept, vec!["2001", "2002", "2004", "2005"]);
}

#[tokio::test]
async fn test_malformed_batch_is_refetched_per_id() {
    let mut server = Server::new_async().await;
    let ids = ["3001", "3002", "3003"];
    let _search = mock_search(&mut server, &ids).await;

    let batch = mock_fetch(&mut server, "3001,3002,3003", "<html>Bad gateway".to_string()).await;
    let first = mock_fetch(&mut server, "3001", article_set(&[article("3001", INDUSTRY)])).await;
    let second = mock_fetch(&mut server, "3002", "<PubmedArticleSet><Pubmed".to_string()).await;
    let third = mock_fetch(&mut server, "3003", article_set(&[article("3003", ACADEMIC)])).await;

    let settings = settings_for(&server);
    let client = client_for(&settings);
    let filter = AffiliationFilter::new(&settings.filter).unwrap();

    let report = pipeline::run(&client, &filter, "kinase inhibitors", 3)
        .await
        .unwrap();

    batch.assert_async().await;
    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;

    assert_eq!(report.parsed, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, "3002");
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].paper.id, "3001");
}

#[tokio::test]
async fn test_search_paginates_until_max_results() {
    let mut server = Server::new_async().await;
    let mut pages = Vec::new();
    for (retstart, ids) in [("0", vec!["1", "2"]), ("2", vec!["3", "4"]), ("4", vec!["5"])] {
        let mock = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("retstart".into(), retstart.into()),
                Matcher::UrlEncoded("term".into(), "aspirin".into()),
            ]))
            .with_status(200)
            .with_body(esearch_body(&ids, 40))
            .expect(1)
            .create_async()
            .await;
        pages.push(mock);
    }

    let mut settings = settings_for(&server);
    settings.search.page_size = 2;
    let client = client_for(&settings);

    let ids = client.search("aspirin", 5).await.unwrap();

    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    for page in &pages {
        page.assert_async().await;
    }
}

#[tokio::test]
async fn test_search_stops_when_count_is_exhausted() {
    let mut server = Server::new_async().await;
    let page = server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::UrlEncoded("retstart".into(), "0".into()))
        .with_status(200)
        .with_body(esearch_body(&["7", "8"], 2))
        .expect(1)
        .create_async()
        .await;

    let mut settings = settings_for(&server);
    settings.search.page_size = 2;
    let client = client_for(&settings);

    let ids = client.search("rare disease", 100).await.unwrap();

    assert_eq!(ids, vec!["7", "8"]);
    page.assert_async().await;
}

#[tokio::test]
async fn test_persistent_rate_limit_surfaces_after_retries() {
    let mut server = Server::new_async().await;
    let limited = server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("Retry-After", "0")
        .expect(3)
        .create_async()
        .await;

    let settings = settings_for(&server);
    let client = client_for(&settings);

    let err = client.search("cancer", 5).await.unwrap_err();

    assert!(matches!(err, PapersError::RateLimited(0)));
    limited.assert_async().await;
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mut server = Server::new_async().await;
    let bad = server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::Any)
        .with_status(400)
        .expect(1)
        .create_async()
        .await;

    let settings = settings_for(&server);
    let client = client_for(&settings);

    let err = client.search("cancer", 5).await.unwrap_err();

    assert!(matches!(err, PapersError::Api { code: 400, .. }));
    bad.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_is_retried_then_succeeds() {
    let mut server = Server::new_async().await;
    let limited = server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("Retry-After", "0")
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(esearch_body(&["9"], 1))
        .expect(1)
        .create_async()
        .await;

    let settings = settings_for(&server);
    let client = client_for(&settings);

    let ids = client.search("cancer", 5).await.unwrap();

    assert_eq!(ids, vec!["9"]);
    limited.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_every_fetch_failing_is_an_error() {
    let mut server = Server::new_async().await;
    let _search = mock_search(&mut server, &["1", "2", "3"]).await;
    let unavailable = server
        .mock("POST", "/efetch.fcgi")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let mut settings = settings_for(&server);
    settings.http.max_retries = 0;
    let client = client_for(&settings);
    let filter = AffiliationFilter::new(&settings.filter).unwrap();

    let err = pipeline::run(&client, &filter, "cancer immunotherapy", 3)
        .await
        .unwrap_err();

    unavailable.assert_async().await;
    match err {
        PapersError::FetchFailed { count, reason } => {
            assert_eq!(count, 3);
            assert!(reason.contains("503"));
        }
        other => panic!("expected FetchFailed, got {:?}", other),
    }
}
