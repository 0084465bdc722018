//! End-to-end job lifecycle against the scripted transport

use async_trait::async_trait;
use backon::BackoffBuilder;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tap_client::mock::MockTransport;
use tap_client::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use tap_client::{
    ConstantBackoff, ExponentialBackoff, NoDelay, ResultFetchFailure, TapClient, TapError,
};
use tap_core::{ErrorOrigin, JobMode, Phase, QuerySpec};

const THREE_ROWS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VOTABLE version="1.4" xmlns="http://www.ivoa.net/xml/VOTable/v1.3">
  <RESOURCE type="results">
    <INFO name="QUERY_STATUS" value="OK"/>
    <TABLE>
      <FIELD name="source_id" datatype="long"/>
      <FIELD name="ra" datatype="double" unit="deg"/>
      <FIELD name="dec" datatype="double" unit="deg"/>
      <DATA>
        <TABLEDATA>
          <TR><TD>1</TD><TD>10.5</TD><TD>-3.25</TD></TR>
          <TR><TD>2</TD><TD>11.0</TD><TD>-3.5</TD></TR>
          <TR><TD>3</TD><TD>12.75</TD><TD>4.0</TD></TR>
        </TABLEDATA>
      </DATA>
    </TABLE>
  </RESOURCE>
</VOTABLE>"#;

const QUERY: &str = "SELECT TOP 5 * FROM table";

/// Exponential schedule that remembers every delay it handed out
#[derive(Debug, Clone)]
struct RecordingBackoff {
    inner: ExponentialBackoff,
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingBackoff {
    fn new(max_attempts: u32) -> Self {
        Self {
            inner: ExponentialBackoff::new(
                Duration::from_millis(1),
                Duration::from_millis(4),
                max_attempts,
            ),
            delays: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn recorded(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

struct Recorded {
    inner: backon::ExponentialBackoff,
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl Iterator for Recorded {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.inner.next()?;
        self.delays.lock().unwrap().push(delay);
        Some(delay)
    }
}

impl BackoffBuilder for RecordingBackoff {
    type Backoff = Recorded;

    fn build(self) -> Recorded {
        Recorded {
            inner: self.inner.build(),
            delays: self.delays,
        }
    }
}

/// Holds every phase request for `latency` before answering
struct SlowPhases {
    inner: Arc<MockTransport>,
    latency: Duration,
}

#[async_trait]
impl Transport for SlowPhases {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if request.url.ends_with("/phase") {
            tokio::time::sleep(self.latency).await;
        }
        self.inner.execute(request).await
    }
}

fn client(mock: &Arc<MockTransport>) -> TapClient {
    TapClient::with_transport("http://test", mock.clone())
        .with_retry_policy(NoDelay::new(5))
        .with_poll_schedule(NoDelay::new(u32::MAX))
}

fn async_service(phases: &[&str]) -> MockTransport {
    MockTransport::new()
        .on(
            Method::Post,
            "/async",
            Ok(HttpResponse::see_other("http://test/async/12345")),
        )
        .on_sequence(
            Method::Get,
            "/async/12345/phase",
            phases.iter().map(|p| Ok(HttpResponse::ok(*p))).collect(),
        )
}

#[tokio::test]
async fn async_job_completes_after_three_polls() {
    let mock = Arc::new(
        async_service(&["QUEUED", "QUEUED", "COMPLETED"]).on(
            Method::Get,
            "/async/12345/results/result",
            Ok(HttpResponse::ok(THREE_ROWS)),
        ),
    );
    let client = client(&mock);

    let mut job = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    assert_eq!(job.id(), Some("12345"));
    assert_eq!(job.phase(), Phase::Queued);

    let phase = client
        .wait_until_done(&mut job, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(phase, Phase::Completed);
    assert_eq!(mock.count(Method::Get, "/phase"), 3);

    let payload = client.fetch_result(&job).await.unwrap();
    let table = client.materialize(&job, payload).unwrap();
    assert_eq!(table.len(), 3);
}

#[tokio::test]
async fn async_job_error_has_no_result() {
    let mock = Arc::new(async_service(&["QUEUED", "QUEUED", "ERROR"]));
    let client = client(&mock);

    let mut job = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    let phase = client
        .wait_until_done(&mut job, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(phase, Phase::Error);
    assert_eq!(job.error().unwrap().origin, ErrorOrigin::Server);
    assert!(job.result_location().is_none());

    let before = mock.request_count();
    let err = client.fetch_result(&job).await.unwrap_err();
    assert!(matches!(
        err,
        TapError::ResultFetch {
            cause: ResultFetchFailure::NotCompleted {
                phase: Phase::Error
            },
            ..
        }
    ));
    assert!(!err.is_retriable());
    assert_eq!(mock.request_count(), before);
}

#[tokio::test]
async fn terminal_phase_does_not_regress() {
    let mock = Arc::new(async_service(&["COMPLETED", "EXECUTING"]));
    let client = client(&mock);

    let mut job = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    assert_eq!(client.poll(&mut job).await.unwrap(), Phase::Completed);

    for _ in 0..3 {
        assert_eq!(client.poll(&mut job).await.unwrap(), Phase::Completed);
    }
    assert_eq!(job.phase(), Phase::Completed);
    assert_eq!(mock.count(Method::Get, "/phase"), 1);
}

#[tokio::test]
async fn fetch_before_completion_sends_nothing() {
    let mock = Arc::new(async_service(&["EXECUTING"]));
    let client = client(&mock);

    let mut job = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    client.poll(&mut job).await.unwrap();
    let before = mock.request_count();

    let err = client.fetch_result(&job).await.unwrap_err();
    assert_eq!(err.job_id(), Some("12345"));
    assert!(matches!(
        err,
        TapError::ResultFetch {
            cause: ResultFetchFailure::NotCompleted {
                phase: Phase::Executing
            },
            ..
        }
    ));
    assert_eq!(mock.request_count(), before);
}

#[tokio::test]
async fn abort_is_idempotent() {
    let mock = Arc::new(async_service(&["EXECUTING"]).on(
        Method::Post,
        "/async/12345/phase",
        Ok(HttpResponse::see_other("http://test/async/12345")),
    ));
    let client = client(&mock);

    let mut job = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    assert_eq!(client.abort(&mut job).await.unwrap(), Phase::Aborted);
    assert_eq!(client.abort(&mut job).await.unwrap(), Phase::Aborted);
    assert_eq!(job.phase(), Phase::Aborted);
    assert_eq!(mock.count(Method::Post, "/async/12345/phase"), 1);

    // Aborted jobs are terminal: polling sends nothing
    assert_eq!(client.poll(&mut job).await.unwrap(), Phase::Aborted);
    assert_eq!(mock.count(Method::Get, "/phase"), 0);
}

#[tokio::test]
async fn sync_votable_round_trip() {
    let mock = Arc::new(MockTransport::new().on(
        Method::Post,
        "/sync",
        Ok(HttpResponse::ok(THREE_ROWS)),
    ));
    let client = client(&mock);

    let (job, table) = client
        .query(&QuerySpec::sync(QUERY), Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(job.mode(), JobMode::Sync);
    assert_eq!(job.phase(), Phase::Completed);
    assert_eq!(table.len(), 3);
    assert_eq!(table.column_names(), vec!["source_id", "ra", "dec"]);
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn poll_retries_with_non_decreasing_delays() {
    let failures = 3;
    let mut replies: Vec<_> = (0..failures)
        .map(|_| Err(TransportError::Connect("connection reset".into())))
        .collect();
    replies.push(Ok(HttpResponse::ok("EXECUTING")));

    let mock = Arc::new(
        MockTransport::new()
            .on(
                Method::Post,
                "/async",
                Ok(HttpResponse::see_other("http://test/async/12345")),
            )
            .on_sequence(Method::Get, "/phase", replies),
    );
    let backoff = RecordingBackoff::new(5);
    let client = TapClient::with_transport("http://test", mock.clone())
        .with_retry_policy(backoff.clone());

    let mut job = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    assert_eq!(client.poll(&mut job).await.unwrap(), Phase::Executing);
    assert_eq!(mock.count(Method::Get, "/phase"), failures + 1);

    let delays = backoff.recorded();
    assert_eq!(delays.len(), failures);
    assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]), "{delays:?}");
}

#[tokio::test]
async fn poll_escalates_to_local_error() {
    let mock = Arc::new(
        MockTransport::new()
            .on(
                Method::Post,
                "/async",
                Ok(HttpResponse::see_other("http://test/async/12345")),
            )
            .on(Method::Get, "/phase", Err(TransportError::Timeout)),
    );
    let backoff = RecordingBackoff::new(3);
    let client = TapClient::with_transport("http://test", mock.clone())
        .with_retry_policy(backoff.clone());

    let mut job = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    let err = client.poll(&mut job).await.unwrap_err();

    match err {
        TapError::Poll {
            ref job_id,
            attempts,
            source: TransportError::Timeout,
        } => {
            assert_eq!(job_id, "12345");
            assert_eq!(attempts, 3);
        }
        ref other => panic!("expected poll error, got {:?}", other),
    }
    assert_eq!(mock.count(Method::Get, "/phase"), 3);
    assert_eq!(backoff.recorded().len(), 2);

    assert_eq!(job.phase(), Phase::Error);
    assert_eq!(job.error().unwrap().origin, ErrorOrigin::Local);

    // The local ERROR is terminal like any other
    assert_eq!(client.poll(&mut job).await.unwrap(), Phase::Error);
    assert_eq!(mock.count(Method::Get, "/phase"), 3);
}

#[tokio::test]
async fn wait_times_out_in_last_phase() {
    let mock = Arc::new(async_service(&["EXECUTING"]));
    let client = TapClient::with_transport("http://test", mock.clone())
        .with_retry_policy(NoDelay::new(1))
        .with_poll_schedule(ConstantBackoff::new(Duration::from_millis(20), u32::MAX));

    let mut job = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    let err = client
        .wait_until_done(&mut job, Duration::from_millis(100))
        .await
        .unwrap_err();

    match err {
        TapError::Timeout {
            job_id, last_phase, ..
        } => {
            assert_eq!(job_id, "12345");
            assert_eq!(last_phase, Phase::Executing);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    // Not aborted; the caller may keep waiting
    assert_eq!(job.phase(), Phase::Executing);
    assert_eq!(mock.count(Method::Post, "/async/12345/phase"), 0);
}

#[tokio::test]
async fn wait_cancels_poll_in_flight_at_deadline() {
    let mock = Arc::new(async_service(&["COMPLETED"]));
    let slow = Arc::new(SlowPhases {
        inner: mock.clone(),
        latency: Duration::from_millis(500),
    });
    let client = TapClient::with_transport("http://test", slow)
        .with_retry_policy(NoDelay::new(1))
        .with_poll_schedule(NoDelay::new(u32::MAX));

    let mut job = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    let err = client
        .wait_until_done(&mut job, Duration::from_millis(100))
        .await
        .unwrap_err();

    match err {
        TapError::Timeout {
            last_phase, waited, ..
        } => {
            assert_eq!(last_phase, Phase::Queued);
            assert!(waited < Duration::from_millis(500), "{waited:?}");
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    // The cancelled poll never got an answer
    assert_eq!(job.phase(), Phase::Queued);
    assert!(job.last_polled_at().is_none());
    assert!(job.result_location().is_none());
    assert_eq!(mock.count(Method::Get, "/phase"), 0);
}

#[tokio::test]
async fn jobs_are_polled_concurrently() {
    let mock = Arc::new(
        MockTransport::new()
            .on_sequence(
                Method::Post,
                "/async",
                vec![
                    Ok(HttpResponse::see_other("http://test/async/1")),
                    Ok(HttpResponse::see_other("http://test/async/2")),
                ],
            )
            .on_sequence(
                Method::Get,
                "/async/1/phase",
                vec![Ok(HttpResponse::ok("EXECUTING")), Ok(HttpResponse::ok("COMPLETED"))],
            )
            .on(Method::Get, "/async/2/phase", Ok(HttpResponse::ok("ABORTED"))),
    );
    let client = client(&mock);

    let mut first = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    let mut second = client.submit(&QuerySpec::asynchronous(QUERY)).await.unwrap();
    assert_eq!(first.id(), Some("1"));
    assert_eq!(second.id(), Some("2"));

    let other = client.clone();
    let timeout = Duration::from_secs(10);
    let (a, b) = tokio::join!(
        client.wait_until_done(&mut first, timeout),
        other.wait_until_done(&mut second, timeout)
    );

    assert_eq!(a.unwrap(), Phase::Completed);
    assert_eq!(b.unwrap(), Phase::Aborted);
    assert_ne!(first.local_id(), second.local_id());
}
