//! Two-node loopback cluster tests over the wire protocol.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tokio::net::TcpStream;

use vantage_service::HealthNode;
use vantage_types::{NodeConfig, Observation, Peer, Report, Status};
use vantage_util::port_allocator::allocate_port;
use vantage_wire::{read_frame, write_frame, LearnKind, ReportResult, Request, Response};

struct Cluster {
    addr_a: String,
    addr_b: String,
    node_a: HealthNode,
    node_b: HealthNode,
    _dirs: (TempDir, TempDir),
}

async fn two_nodes(filter_a: bool, subjects_a: &[&str]) -> Cluster {
    let addr_a = format!("127.0.0.1:{}", allocate_port());
    let addr_b = format!("127.0.0.1:{}", allocate_port());
    let peers: HashMap<String, String> = HashMap::from([
        ("node-a".to_string(), addr_a.clone()),
        ("node-b".to_string(), addr_b.clone()),
    ]);
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let node_a = HealthNode::new(NodeConfig {
        id: "node-a".to_string(),
        addr: addr_a.clone(),
        peers: peers.clone(),
        subjects: subjects_a.iter().map(|s| (*s).to_string()).collect(),
        filter_submission: filter_a,
        db_file: dir_a.path().join("a.db").display().to_string(),
        ..Default::default()
    });
    let node_b = HealthNode::new(NodeConfig {
        id: "node-b".to_string(),
        addr: addr_b.clone(),
        peers,
        db_file: dir_b.path().join("b.db").display().to_string(),
        ..Default::default()
    });
    node_a.start().await.unwrap();
    node_b.start().await.unwrap();

    Cluster {
        addr_a,
        addr_b,
        node_a,
        node_b,
        _dirs: (dir_a, dir_b),
    }
}

async fn call(addr: &str, request: Request) -> Response {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    write_frame(&mut stream, &request).await.unwrap();
    read_frame(&mut stream).await.unwrap().unwrap()
}

fn healthy_report(observer: &str, subject: &str, score: f32) -> Report {
    let mut observation = Observation::new(SystemTime::now());
    observation.add_metric("cpu", Status::Healthy, score);
    Report::new(observer, subject, observation)
}

async fn wait_until<F, Fut>(mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if probe().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn wire_round_trip_register_submit_query() {
    let cluster = two_nodes(false, &["db"]).await;
    let addr = cluster.addr_a.clone();

    let Response::Handle { handle } = call(
        &addr,
        Request::Register {
            module: "mod".to_string(),
            observer: "obs1".to_string(),
        },
    )
    .await
    else {
        panic!("register failed")
    };
    assert_eq!(handle, 10000);

    let report = healthy_report("obs1", "db", 90.0);
    let Response::Outcome { result } = call(
        &addr,
        Request::SubmitReport {
            handle,
            report: report.clone(),
        },
    )
    .await
    else {
        panic!("submit failed")
    };
    assert_eq!(result, ReportResult::Accepted);

    let Response::Report(latest) = call(
        &addr,
        Request::GetLatestReport {
            subject: "db".to_string(),
        },
    )
    .await
    else {
        panic!("latest report missing")
    };
    assert_eq!(latest.observer, "obs1");

    wait_until(|| {
        let addr = addr.clone();
        async move {
            matches!(
                call(
                    &addr,
                    Request::GetInference {
                        subject: "db".to_string()
                    }
                )
                .await,
                Response::Inference(_)
            )
        }
    })
    .await;

    // An unknown subject is an error reply, not an empty payload.
    let response = call(
        &addr,
        Request::GetLatestReport {
            subject: "nothing".to_string(),
        },
    )
    .await;
    assert!(matches!(response, Response::Error { .. }));

    cluster.node_a.stop(true).await.unwrap();
    cluster.node_b.stop(true).await.unwrap();
}

#[tokio::test]
async fn subscription_carries_reports_across_nodes() {
    let cluster = two_nodes(true, &[]).await;

    // A starts observing; the subscription reaches B.
    let Response::Success { success } = call(
        &cluster.addr_a,
        Request::Observe {
            subject: "db".to_string(),
        },
    )
    .await
    else {
        panic!("observe failed")
    };
    assert!(success);

    // Propagation needs B to have seen A's subscription first.
    let node_b = cluster.node_b.clone();
    wait_until(|| {
        let node_b = node_b.clone();
        async move {
            node_b
                .exchange()
                .interested_peers("db")
                .await
                .contains("node-a")
        }
    })
    .await;

    // B submits a local report about db; its exchange pushes it to A.
    let Response::Handle { handle } = call(
        &cluster.addr_b,
        Request::Register {
            module: "mod".to_string(),
            observer: "b-obs".to_string(),
        },
    )
    .await
    else {
        panic!("register failed")
    };

    let Response::Outcome { result } = call(
        &cluster.addr_b,
        Request::SubmitReport {
            handle,
            report: healthy_report("b-obs", "db", 85.0),
        },
    )
    .await
    else {
        panic!("submit failed")
    };
    assert_eq!(result, ReportResult::Accepted);

    // A learns the report and its panorama includes B's observer.
    let addr_a = cluster.addr_a.clone();
    wait_until(|| {
        let addr_a = addr_a.clone();
        async move {
            match call(
                &addr_a,
                Request::GetPanorama {
                    subject: "db".to_string(),
                },
            )
            .await
            {
                Response::Panorama(panorama) => panorama.views.contains_key("b-obs"),
                _ => false,
            }
        }
    })
    .await;

    cluster.node_a.stop(true).await.unwrap();
    cluster.node_b.stop(true).await.unwrap();
}

#[tokio::test]
async fn held_reports_revive_once_interest_develops() {
    let cluster = two_nodes(true, &[]).await;

    // A report about an unwatched subject arrives at A and is held.
    let Response::Outcome { result } = call(
        &cluster.addr_a,
        Request::LearnReport {
            source: Peer::new("node-b", cluster.addr_b.clone()),
            kind: LearnKind::Normal,
            report: healthy_report("remote-obs", "db", 40.0),
        },
    )
    .await
    else {
        panic!("learn failed")
    };
    assert_eq!(result, ReportResult::Ignored);

    // A becomes interested and submits a matching local event.
    call(
        &cluster.addr_a,
        Request::Observe {
            subject: "db".to_string(),
        },
    )
    .await;
    let Response::Handle { handle } = call(
        &cluster.addr_a,
        Request::Register {
            module: "mod".to_string(),
            observer: "a-obs".to_string(),
        },
    )
    .await
    else {
        panic!("register failed")
    };
    call(
        &cluster.addr_a,
        Request::SubmitReport {
            handle,
            report: healthy_report("a-obs", "db", 90.0),
        },
    )
    .await;

    // The held report is back in the store.
    let addr_a = cluster.addr_a.clone();
    wait_until(|| {
        let addr_a = addr_a.clone();
        async move {
            match call(
                &addr_a,
                Request::GetPanorama {
                    subject: "db".to_string(),
                },
            )
            .await
            {
                Response::Panorama(panorama) => {
                    panorama.views.contains_key("remote-obs")
                        && panorama.views.contains_key("a-obs")
                }
                _ => false,
            }
        }
    })
    .await;

    // And the revival subscribed A to db on B's side, so B now pushes
    // its own reports about db to A.
    let node_b = cluster.node_b.clone();
    wait_until(|| {
        let node_b = node_b.clone();
        async move {
            node_b
                .exchange()
                .interested_peers("db")
                .await
                .contains("node-a")
        }
    })
    .await;

    cluster.node_a.stop(true).await.unwrap();
    cluster.node_b.stop(true).await.unwrap();
}

#[tokio::test]
async fn ping_peers_and_identity() {
    let cluster = two_nodes(false, &[]).await;

    let Response::Pong { .. } = call(
        &cluster.addr_a,
        Request::Ping {
            source: Peer::new("node-b", cluster.addr_b.clone()),
            time: SystemTime::now(),
        },
    )
    .await
    else {
        panic!("ping failed")
    };

    let Response::Id(me) = call(&cluster.addr_a, Request::GetId).await else {
        panic!("get id failed")
    };
    assert_eq!(me.id, "node-a");

    let Response::Peers(peers) = call(&cluster.addr_a, Request::GetPeers).await else {
        panic!("get peers failed")
    };
    assert_eq!(peers.len(), 2);

    let Response::Subjects(subjects) = call(&cluster.addr_a, Request::GetObservedSubjects).await
    else {
        panic!("get subjects failed")
    };
    assert!(subjects.is_empty());

    cluster.node_a.stop(true).await.unwrap();
    cluster.node_b.stop(true).await.unwrap();
}
