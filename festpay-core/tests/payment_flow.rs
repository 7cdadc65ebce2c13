mod common;

use common::{ScriptedBackend, Terminal, provisioned, tag};
use festpay_core::card::{ActivityCode, ActivityResult, CardPaymentState, CheckoutPayload};
use festpay_core::entities::{Amount, PaymentMethod, PaymentRequest};
use festpay_core::orchestrator::{BookingOutcome, PaymentError, PaymentStatus};
use festpay_core::tags::{ScanOutcome, TagReadError};
use festpay_sdk::objects::BookingError;
use rust_decimal_macros::dec;

fn approved() -> ActivityResult {
    ActivityResult {
        code: ActivityCode::Ok,
        payload: Some(CheckoutPayload {
            result_code: CheckoutPayload::SUCCESS,
            token: Some("txn-42".to_string()),
            message: None,
        }),
    }
}

#[tokio::test]
async fn test_scan_then_cash_payment_is_booked() {
    let mut terminal = Terminal::new(ScriptedBackend::new(), None);
    let _shutdown = terminal.spawn_processor();
    terminal.reader.push(Err(TagReadError::TagLost));
    terminal.reader.push(provisioned(0x1234));

    let tag = terminal.orchestrator.scan_tag().await.unwrap();
    let receipt = terminal
        .orchestrator
        .pay_with_cash(tag, dec!(10.00), dec!(0))
        .await
        .unwrap();

    assert_eq!(receipt.outcome, BookingOutcome::Booked);
    assert_eq!(receipt.request.method(), PaymentMethod::Cash);
    assert_eq!(receipt.request.tag().uid(), 0x1234);
    assert!(terminal.queue.is_empty().await.unwrap());
    assert_eq!(
        terminal.orchestrator.session().current(),
        PaymentStatus::Completed(receipt)
    );
}

#[tokio::test]
async fn test_cash_payment_is_kept_while_backend_is_down() {
    let backend = ScriptedBackend::failing(BookingError::Request("offline".to_string()));
    let mut terminal = Terminal::new(backend, None);
    let _shutdown = terminal.spawn_processor();

    let receipt = terminal
        .orchestrator
        .pay_with_cash(tag(1).await, dec!(20), dec!(0))
        .await
        .unwrap();

    assert_eq!(receipt.outcome, BookingOutcome::Queued);
    let entry = terminal.queue.get(receipt.request.id()).await.unwrap().unwrap();
    assert_eq!(entry.request, receipt.request);
}

#[tokio::test]
async fn test_declined_card_is_never_queued() {
    let declined = ActivityResult {
        code: ActivityCode::Other(1),
        payload: None,
    };
    let terminal = Terminal::new(ScriptedBackend::new(), Some(declined));
    let mut card_state = terminal.orchestrator.gateway().state();

    let result = terminal
        .orchestrator
        .pay_with_card(tag(1).await, dec!(5.00), dec!(0))
        .await;

    let (request, state) = match result {
        Err(PaymentError::Card { request, state }) => (request, state),
        other => panic!("expected a card failure, got {other:?}"),
    };
    assert!(matches!(state, CardPaymentState::Failed(_)));
    assert!(card_state.has_changed().unwrap());
    assert_eq!(*card_state.borrow_and_update(), state);
    assert_eq!(terminal.sdk.checkout_ids(), vec![request.id()]);
    assert!(terminal.queue.is_empty().await.unwrap());
    assert!(matches!(
        terminal.orchestrator.session().current(),
        PaymentStatus::Failed(_)
    ));
}

#[tokio::test]
async fn test_card_retry_reuses_the_request_id() {
    let mut terminal = Terminal::new(ScriptedBackend::new(), Some(ActivityResult::canceled()));
    let _shutdown = terminal.spawn_processor();

    let Err(PaymentError::Card { request, .. }) = terminal
        .orchestrator
        .pay_with_card(tag(9).await, dec!(30), dec!(3))
        .await
    else {
        panic!("expected the canceled checkout to fail");
    };

    *terminal.sdk.result.lock().unwrap() = Some(approved());
    let receipt = terminal.orchestrator.retry_card(*request.clone()).await.unwrap();

    assert_eq!(receipt.request.id(), request.id());
    assert_eq!(receipt.card_token.as_deref(), Some("txn-42"));
    assert_eq!(receipt.outcome, BookingOutcome::Booked);
    assert_eq!(terminal.sdk.checkout_ids(), vec![request.id(), request.id()]);
    assert_eq!(terminal.backend.attempts(request.id()), 1);
}

#[tokio::test]
async fn test_missing_key_ends_the_scan() {
    let terminal = Terminal::new(ScriptedBackend::new(), None);
    terminal.reader.push(Err(TagReadError::NoKey));

    let result = terminal.orchestrator.scan_tag().await;

    assert!(matches!(
        result,
        Err(PaymentError::Scan(ScanOutcome::NoKey))
    ));
    assert!(matches!(
        terminal.orchestrator.session().current(),
        PaymentStatus::Failed(_)
    ));
}

#[tokio::test]
async fn test_invalid_amount_is_refused_before_charging() {
    let terminal = Terminal::new(ScriptedBackend::new(), Some(approved()));

    let result = terminal
        .orchestrator
        .pay_with_card(tag(1).await, dec!(0), dec!(0))
        .await;

    assert!(matches!(result, Err(PaymentError::Amount(_))));
    assert!(terminal.sdk.checkout_ids().is_empty());
}

#[tokio::test]
async fn test_card_retry_refuses_cash_and_charged_requests() {
    let terminal = Terminal::new(ScriptedBackend::new(), Some(approved()));

    let cash = PaymentRequest::new(
        tag(4).await,
        Amount::new(dec!(8)).unwrap(),
        dec!(0),
        PaymentMethod::Cash,
    )
    .unwrap();
    let result = terminal.orchestrator.retry_card(cash).await;
    assert!(matches!(
        result,
        Err(PaymentError::NotCard(PaymentMethod::Cash))
    ));
    assert!(terminal.sdk.checkout_ids().is_empty());

    // No replay processor runs, so the charged booking stays queued.
    let receipt = terminal
        .orchestrator
        .pay_with_card(tag(4).await, dec!(8), dec!(0))
        .await
        .unwrap();
    assert_eq!(receipt.outcome, BookingOutcome::Queued);

    let result = terminal.orchestrator.retry_card(receipt.request.clone()).await;
    assert!(matches!(
        result,
        Err(PaymentError::AlreadyCharged(id)) if id == receipt.request.id()
    ));
    assert_eq!(terminal.sdk.checkout_ids(), vec![receipt.request.id()]);
}
