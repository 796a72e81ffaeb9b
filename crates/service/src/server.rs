//! TCP accept loop and request dispatch.

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use vantage_wire::{read_frame, write_frame, PingStatus, Request, Response};

use crate::node::HealthNode;

/// Accept connections until cancelled, one task per connection.
pub(crate) async fn serve(
    listener: TcpListener,
    node: HealthNode,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        debug!(%addr, "accepted connection");
                        let node = node.clone();
                        let cancel = cancel.clone();
                        tracker.spawn(async move {
                            handle_connection(stream, node, cancel).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
            () = cancel.cancelled() => break,
        }
    }
    debug!("accept loop stopped");
}

/// Serve one connection: read request frames, dispatch, write replies.
/// Per-connection errors end the connection, never the server.
async fn handle_connection(mut stream: TcpStream, node: HealthNode, cancel: CancellationToken) {
    loop {
        let request: Request = tokio::select! {
            read = read_frame(&mut stream) => match read {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "connection read failed");
                    break;
                }
            },
            () = cancel.cancelled() => break,
        };
        let response = dispatch(&node, request).await;
        if let Err(e) = write_frame(&mut stream, &response).await {
            debug!(error = %e, "connection write failed");
            break;
        }
    }
}

/// Map one request onto the node, folding errors into error replies.
async fn dispatch(node: &HealthNode, request: Request) -> Response {
    match request {
        Request::Register { module, observer } => match node.register(&module, &observer).await {
            Ok(handle) => Response::Handle { handle },
            Err(e) => error_reply(&e),
        },
        Request::SubmitReport { handle, report } => {
            match node.submit_report(handle, report).await {
                Ok(result) => Response::Outcome { result },
                Err(e) => error_reply(&e),
            }
        }
        Request::LearnReport {
            source,
            kind,
            report,
        } => match node.learn_report(source, kind, report).await {
            Ok(result) => Response::Outcome { result },
            Err(e) => error_reply(&e),
        },
        Request::GetLatestReport { subject } => match node.latest_report(&subject).await {
            Ok(report) => Response::Report(report),
            Err(e) => error_reply(&e),
        },
        Request::GetPanorama { subject } => match node.panorama(&subject).await {
            Ok(panorama) => Response::Panorama(panorama),
            Err(e) => error_reply(&e),
        },
        Request::GetView { subject, observer } => match node.view(&subject, &observer).await {
            Ok(view) => Response::View(view),
            Err(e) => error_reply(&e),
        },
        Request::GetInference { subject } => match node.get_inference(&subject).await {
            Ok(inference) => Response::Inference(inference),
            Err(e) => error_reply(&e),
        },
        Request::Observe { subject } => Response::Success {
            success: node.observe(&subject).await,
        },
        Request::StopObserving { subject } => Response::Success {
            success: node.stop_observing(&subject).await,
        },
        Request::GetObservedSubjects => Response::Subjects(node.observed_subjects().await),
        Request::DumpPanorama => Response::Panoramas(node.dump_panorama().await),
        Request::DumpInference => Response::Inferences(node.dump_inference().await),
        Request::Ping { source, time } => Response::Pong {
            result: PingStatus::Good,
            time: node.ping(&source, time),
        },
        Request::GetPeers => Response::Peers(node.peers()),
        Request::GetId => Response::Id(node.id()),
    }
}

fn error_reply(error: &crate::Error) -> Response {
    Response::Error {
        message: error.to_string(),
    }
}
