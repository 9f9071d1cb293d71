//! Edit-transaction brackets and destructive operations are socket-only:
//! elsewhere they fail with a typed message before anything is dispatched.

mod common;

use common::{stack_with, MockAction, MockPublisher};
use meshadmin::storage::CommandStatus;
use meshadmin::transport::TransportKind;

#[tokio::test]
async fn edit_transaction_requires_explicit_ack() {
    let publisher = MockPublisher::answering(TransportKind::Socket);
    let stack = stack_with(publisher).await;

    let begin = stack.admin.begin_edit_settings(0x42).await;
    assert!(begin.success);
    assert_eq!(begin.acknowledged, Some(true));

    let commit = stack.admin.commit_edit_settings(0x42).await;
    assert!(commit.success);

    assert_eq!(
        stack.publisher.sent_ops(),
        vec!["begin_edit_settings", "commit_edit_settings"]
    );
}

#[tokio::test]
async fn edit_transaction_times_out_without_ack() {
    // Unlike plain writes, a transaction bracket with no ack is a failure.
    let publisher = MockPublisher::new(TransportKind::Socket, |_req, _t| MockAction::Silence);
    let stack = stack_with(publisher).await;

    let begin = stack.admin.begin_edit_settings(0x42).await;
    assert!(!begin.success);
    assert!(begin.error.unwrap().contains("no acknowledgement"));

    let log = stack.storage.admin_log(Some(0x42), 10).await;
    assert_eq!(log[0].status, CommandStatus::Timeout);
}

#[tokio::test]
async fn edit_transaction_rejected_on_broadcast() {
    let publisher = MockPublisher::answering(TransportKind::Broadcast);
    let stack = stack_with(publisher).await;

    let result = stack.admin.begin_edit_settings(0x42).await;
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("not supported on the broadcast transport"), "{}", error);
    // Typed failure, no attempt made
    assert!(stack.publisher.sent_ops().is_empty());
}

#[tokio::test]
async fn destructive_ops_rejected_off_socket() {
    let publisher = MockPublisher::answering(TransportKind::Serial);
    let stack = stack_with(publisher).await;

    for result in [
        stack.admin.remove_node(0x42, 0x43).await,
        stack.admin.reset_nodedb(0x42).await,
        stack.admin.factory_reset_config(0x42).await,
        stack.admin.factory_reset_device(0x42).await,
    ] {
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not supported"));
    }
    assert!(stack.publisher.sent_ops().is_empty());
}

#[tokio::test]
async fn destructive_ops_work_on_socket() {
    let publisher = MockPublisher::answering(TransportKind::Socket);
    let stack = stack_with(publisher).await;

    let result = stack.admin.remove_node(0x42, 0x43).await;
    assert!(result.success);
    assert_eq!(result.acknowledged, Some(true));

    let reset = stack.admin.factory_reset_device(0x42).await;
    assert!(reset.success);

    let log = stack.storage.admin_log(Some(0x42), 10).await;
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|e| e.status == CommandStatus::Success));
}
