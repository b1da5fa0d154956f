use botbazaar::application::market::Marketplace;
use botbazaar::domain::bot::ChatMessage;
use botbazaar::domain::money::Units;
use botbazaar::domain::ports::Collaborators;
use botbazaar::error::MarketError;
use botbazaar::infrastructure::in_memory::InMemoryMarketStore;
use std::sync::Arc;

mod common;

use common::PLATFORM;

#[tokio::test]
async fn test_resale_pays_seller_creator_and_platform() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 1000).await;
    common::register(&market, "alice").await;
    common::register(&market, "bob").await;

    let first = market
        .escrow
        .purchase("alice", &bot_id, Units::new(1000), None)
        .await
        .unwrap();
    assert_eq!(first.split.seller, Units::new(800));
    assert_eq!(first.split.creator, Units::new(50));
    assert_eq!(first.split.platform, Units::new(150));

    market
        .escrow
        .list("alice", &bot_id, Units::new(2000))
        .await
        .unwrap();
    market
        .escrow
        .purchase("bob", &bot_id, Units::new(2000), None)
        .await
        .unwrap();

    assert_eq!(market.ledger.resting_balance("alice").await.unwrap(), Units::new(1600));
    assert_eq!(market.ledger.resting_balance("creator").await.unwrap(), Units::new(950));
    assert_eq!(market.ledger.resting_balance(PLATFORM).await.unwrap(), Units::new(450));
    assert_eq!(
        common::ledger_total(&market, &["alice", "bob", "creator", PLATFORM]).await,
        3000
    );

    let owned = market.escrow.own_bots("bob").await.unwrap();
    assert_eq!(owned.len(), 1);
    assert!(market.escrow.own_bots("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_residual_of_odd_amounts_goes_to_platform() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 1000).await;
    common::register(&market, "buyer").await;

    let purchase = market
        .escrow
        .purchase("buyer", &bot_id, Units::new(1003), None)
        .await
        .unwrap();

    // 1003 * 0.80 = 802.4 and 1003 * 0.05 = 50.15, both truncated
    assert_eq!(purchase.split.seller, Units::new(802));
    assert_eq!(purchase.split.creator, Units::new(50));
    assert_eq!(purchase.split.platform, Units::new(151));
    assert_eq!(
        common::ledger_total(&market, &["buyer", "creator", PLATFORM]).await,
        1003
    );
}

#[tokio::test]
async fn test_purchase_seeds_trial_conversation() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 1000).await;
    common::register(&market, "buyer").await;

    let purchase = market
        .escrow
        .purchase(
            "buyer",
            &bot_id,
            Units::new(1000),
            Some(vec![ChatMessage::user("what can you do?")]),
        )
        .await
        .unwrap();
    assert!(purchase.conversation_id.is_some());

    let without = common::listed_bot(&market, "other", 1000).await;
    let purchase = market
        .escrow
        .purchase("buyer", &without, Units::new(1000), Some(Vec::new()))
        .await
        .unwrap();
    assert!(purchase.conversation_id.is_none());
}

#[tokio::test]
async fn test_purchase_of_unlisted_bot_refunds_minus_fee() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 1000).await;
    common::register(&market, "buyer").await;
    market.escrow.delist("creator", &bot_id).await.unwrap();

    let result = market
        .escrow
        .purchase("buyer", &bot_id, Units::new(1000), None)
        .await;

    match result {
        Err(MarketError::AlreadySold { refunded, .. }) => assert_eq!(refunded, Units::new(900)),
        other => panic!("expected AlreadySold, got {:?}", other),
    }
    assert_eq!(market.ledger.resting_balance("buyer").await.unwrap(), Units::new(900));
    assert_eq!(market.ledger.resting_balance("creator").await.unwrap(), Units::ZERO);
}

#[tokio::test]
async fn test_underpayment_is_refunded() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 5000).await;
    common::register(&market, "buyer").await;

    let result = market
        .escrow
        .purchase("buyer", &bot_id, Units::new(4000), None)
        .await;

    assert!(matches!(result, Err(MarketError::ValidationError(_))));
    assert_eq!(market.ledger.resting_balance("buyer").await.unwrap(), Units::new(3900));
    assert_eq!(market.escrow.price(&bot_id).await.unwrap(), Units::new(5000));
}

#[tokio::test]
async fn test_trial_splits_and_keeps_listing() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 1000).await;
    common::register(&market, "buyer").await;

    let trial = market
        .escrow
        .try_before_buy(
            "buyer",
            &bot_id,
            vec![ChatMessage::user("tell me a joke")],
            Units::new(200),
        )
        .await
        .unwrap();

    assert_eq!(trial.reply, "You said: tell me a joke");
    // seller and creator are the same account here: 100 + 10
    assert_eq!(market.ledger.resting_balance("creator").await.unwrap(), Units::new(110));
    assert_eq!(market.ledger.resting_balance(PLATFORM).await.unwrap(), Units::new(90));
    assert_eq!(market.escrow.price(&bot_id).await.unwrap(), Units::new(1000));
}

#[tokio::test]
async fn test_failed_trial_reply_refunds_buyer() {
    let market = Marketplace::open(
        Arc::new(InMemoryMarketStore::new()),
        common::config(),
        Collaborators {
            responder: Arc::new(common::FailingResponder),
            ..common::collaborators()
        },
    )
    .await
    .unwrap();
    let bot_id = common::listed_bot(&market, "creator", 1000).await;
    common::register(&market, "buyer").await;

    let result = market
        .escrow
        .try_before_buy("buyer", &bot_id, vec![ChatMessage::user("hi")], Units::new(300))
        .await;

    assert!(matches!(result, Err(MarketError::CollaboratorError(_))));
    assert_eq!(market.ledger.resting_balance("buyer").await.unwrap(), Units::new(200));
    assert_eq!(market.ledger.resting_balance("creator").await.unwrap(), Units::ZERO);
}

#[tokio::test]
async fn test_cash_out_lifecycle() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 2000).await;
    common::register(&market, "buyer").await;
    market
        .escrow
        .purchase("buyer", &bot_id, Units::new(2000), None)
        .await
        .unwrap();

    let pending = market.payouts.request_payout("creator").await.unwrap();
    assert_eq!(pending.amount, Units::new(1700));
    assert!(!pending.acknowledged);
    assert_eq!(market.ledger.resting_balance("creator").await.unwrap(), Units::ZERO);
    assert_eq!(market.ledger.effective_balance("creator").await.unwrap(), Units::new(1700));

    let replay = market.payouts.request_payout("creator").await.unwrap();
    assert_eq!(replay.payment_id, pending.payment_id);
    assert_eq!(replay.nonces, pending.nonces);

    let acked = market
        .acknowledgments
        .acknowledge("creator", &pending.payment_id)
        .await
        .unwrap();
    assert!(acked.acknowledged);
    assert_eq!(market.ledger.effective_balance("creator").await.unwrap(), Units::ZERO);

    let again = market
        .acknowledgments
        .acknowledge("creator", &pending.payment_id)
        .await;
    assert!(matches!(again, Err(MarketError::AlreadyAcknowledged(_))));

    let empty = market.payouts.request_payout("creator").await;
    assert!(matches!(empty, Err(MarketError::InsufficientBalance { .. })));

    let history = market.acknowledgments.history("creator").await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_listed_bot_cannot_be_deleted() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 1000).await;

    let result = market.escrow.delete_bot("creator", &bot_id).await;
    assert!(matches!(result, Err(MarketError::Conflict(_))));

    market.escrow.delist("creator", &bot_id).await.unwrap();
    market.escrow.delete_bot("creator", &bot_id).await.unwrap();
    assert!(market.escrow.own_bots("creator").await.unwrap().is_empty());
    assert!(market.escrow.listings().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unregistered_buyer_is_rejected() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 1000).await;

    let result = market
        .escrow
        .purchase("stranger", &bot_id, Units::new(1000), None)
        .await;

    assert!(matches!(result, Err(MarketError::NotFound(_))));
    assert_eq!(market.escrow.price(&bot_id).await.unwrap(), Units::new(1000));
}

#[tokio::test]
async fn test_trial_without_messages_is_refunded() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 1000).await;
    common::register(&market, "buyer").await;

    let result = market
        .escrow
        .try_before_buy("buyer", &bot_id, Vec::new(), Units::new(500))
        .await;

    assert!(matches!(result, Err(MarketError::ValidationError(_))));
    assert_eq!(market.ledger.resting_balance("buyer").await.unwrap(), Units::new(400));
    assert_eq!(
        common::ledger_total(&market, &["buyer", "creator", PLATFORM]).await,
        400
    );
}

#[tokio::test]
async fn test_new_owner_continues_trial_conversation() {
    let market = common::market().await;
    let bot_id = common::listed_bot(&market, "creator", 1000).await;
    common::register(&market, "buyer").await;
    let seeded = market
        .conversations
        .create("creator", &bot_id, "Before the sale")
        .await
        .unwrap();

    let purchase = market
        .escrow
        .purchase(
            "buyer",
            &bot_id,
            Units::new(1000),
            Some(vec![ChatMessage::user("what can you do?")]),
        )
        .await
        .unwrap();
    let conversation_id = purchase.conversation_id.unwrap();

    let reply = market
        .conversations
        .send_message("buyer", &bot_id, &conversation_id, "tell me more")
        .await
        .unwrap();
    assert_eq!(reply, "You said: tell me more");
    let turns = market
        .conversations
        .messages("buyer", &bot_id, &conversation_id)
        .await
        .unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].content, "what can you do?");

    // the seller's own thread stays out of the buyer's reach, and vice versa
    assert!(matches!(
        market
            .conversations
            .messages("buyer", &bot_id, &seeded.id)
            .await,
        Err(MarketError::Unauthorized(_))
    ));
    assert!(matches!(
        market
            .conversations
            .send_message("creator", &bot_id, &conversation_id, "hi")
            .await,
        Err(MarketError::Unauthorized(_))
    ));
    let listed = market
        .conversations
        .list_with_bot("buyer", &bot_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}
