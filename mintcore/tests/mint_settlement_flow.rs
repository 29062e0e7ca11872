//! End-to-end flow over the in-memory stores: production intake →
//! reservation → batch assembly → mint → settlement, plus the
//! idempotency and at-most-once guarantees along the way.

use async_trait::async_trait;
use mintcore::{
    BlockchainMintClient, BlueprintCatalog, BrandDirectory, BrandId, CoreError, CoreResult,
    DocumentKey, DocumentStore, InspectionResult, InspectionSource, InventoryLot, LotKey,
    MintBatch, MintClientError, MintReceipt, MintRequest, MintOrchestrator, ModelId, OrderId,
    ProductId, ProductionIntake, ProductionRunId, ProductRepo, ReservationCoordinator, Timestamp,
    TokenBlueprint, TokenBlueprintId, TransferSettlement, UserId, WalletAddress,
};
use mintcore_memory::InMemoryDocumentStore;
use std::sync::{Arc, Mutex};

fn lot_key() -> LotKey {
    LotKey::try_new("hoodie_tb1").expect("valid lot key")
}

fn model() -> ModelId {
    ModelId::try_new("M1").expect("valid model id")
}

fn order() -> OrderId {
    OrderId::try_new("order-A").expect("valid order id")
}

fn unit(id: &str) -> ProductId {
    ProductId::try_new(id).expect("valid product id")
}

fn brand() -> BrandId {
    BrandId::try_new("brand1").expect("valid brand id")
}

fn blueprint_id() -> TokenBlueprintId {
    TokenBlueprintId::try_new("tb1").expect("valid blueprint id")
}

fn user() -> UserId {
    UserId::try_new("ops-1").expect("valid user id")
}

/// Product repository that records every notification.
#[derive(Default)]
struct RecordingProductRepo {
    seen: Mutex<Vec<(ProductId, bool)>>,
}

#[async_trait]
impl ProductRepo for RecordingProductRepo {
    async fn update_inspection_result(
        &self,
        product: &ProductId,
        result: &InspectionResult,
    ) -> CoreResult<()> {
        self.seen
            .lock()
            .expect("mutex poisoned")
            .push((product.clone(), result.passed()));
        Ok(())
    }
}

struct StaticDirectory;

#[async_trait]
impl BrandDirectory for StaticDirectory {
    async fn wallet_address(&self, _brand: &BrandId) -> CoreResult<WalletAddress> {
        Ok(WalletAddress::try_new("brand-wallet-1").expect("valid wallet"))
    }
}

#[async_trait]
impl BlueprintCatalog for StaticDirectory {
    async fn blueprint(&self, _id: &TokenBlueprintId) -> CoreResult<TokenBlueprint> {
        Ok(TokenBlueprint {
            name: "Hoodie Genesis".to_string(),
            symbol: "HOOD".to_string(),
            metadata_uri: "https://meta.example/hoodie.json".to_string(),
        })
    }
}

/// Chain client that succeeds and records the requests it saw.
#[derive(Default)]
struct OkMintClient {
    requests: Mutex<Vec<MintRequest>>,
}

#[async_trait]
impl BlockchainMintClient for OkMintClient {
    async fn mint(&self, request: &MintRequest) -> Result<MintReceipt, MintClientError> {
        self.requests
            .lock()
            .expect("mutex poisoned")
            .push(request.clone());
        Ok(MintReceipt {
            tx_signature: mintcore::TxSignature::try_new("sig1").expect("valid signature"),
            mint_address: mintcore::MintAddress::try_new("addr1").expect("valid address"),
        })
    }
}

/// Chain client that always rejects.
struct RejectingMintClient;

#[async_trait]
impl BlockchainMintClient for RejectingMintClient {
    async fn mint(&self, _request: &MintRequest) -> Result<MintReceipt, MintClientError> {
        Err(MintClientError::Rejected("insufficient funds".to_string()))
    }
}

struct FixedInspection {
    passed: Vec<ProductId>,
}

#[async_trait]
impl InspectionSource for FixedInspection {
    async fn passed_products(&self, _run: &ProductionRunId) -> CoreResult<Vec<ProductId>> {
        Ok(self.passed.clone())
    }
}

fn orchestrator<C: BlockchainMintClient>(
    store: InMemoryDocumentStore<MintBatch>,
    client: C,
) -> MintOrchestrator<InMemoryDocumentStore<MintBatch>, C> {
    MintOrchestrator::new(store, client, Arc::new(StaticDirectory), Arc::new(StaticDirectory))
}

#[tokio::test]
async fn full_pipeline_from_intake_to_settlement() {
    let lots: InMemoryDocumentStore<InventoryLot> = InMemoryDocumentStore::new();
    let batches: InMemoryDocumentStore<MintBatch> = InMemoryDocumentStore::new();

    // Production intake: two units pass, one fails.
    let repo = Arc::new(RecordingProductRepo::default());
    let intake = ProductionIntake::new(
        ReservationCoordinator::new(lots.clone()),
        Arc::clone(&repo),
    );
    let results = vec![
        (unit("u1"), InspectionResult::Passed),
        (unit("u2"), InspectionResult::Passed),
        (
            unit("u3"),
            InspectionResult::Failed {
                reason: "stitching".to_string(),
            },
        ),
    ];
    let lot = intake
        .record_inspection(&lot_key(), "warehouse-9", &model(), &results)
        .await
        .expect("intake succeeds");

    assert_eq!(lot.location, "warehouse-9");
    assert_eq!(lot.stock_by_model[&model()].unit_ids.len(), 2);
    assert_eq!(repo.seen.lock().unwrap().len(), 3);

    // Checkout reserves both passed units.
    let coordinator = ReservationCoordinator::new(lots.clone());
    coordinator
        .reserve(&lot_key(), &model(), &order(), 2)
        .await
        .expect("reservation succeeds");

    // Assemble and drive the mint.
    let minter = orchestrator(batches.clone(), OkMintClient::default());
    let batch = minter
        .create_batch(
            brand(),
            blueprint_id(),
            &[unit("u1"), unit("u2")],
            user(),
            Timestamp::now(),
        )
        .await
        .expect("batch persists");

    let context = minter
        .load_for_minting(&batch.id)
        .await
        .expect("context resolves");
    assert_eq!(context.amount, 2);
    assert_eq!(context.destination.as_ref(), "brand-wallet-1");
    assert_eq!(context.symbol, "HOOD");

    let result = minter.submit(&context).await.expect("mint lands");
    minter
        .mark_minted(&batch.id, &result, Timestamp::now())
        .await
        .expect("mark succeeds");

    let stored = batches
        .get(&DocumentKey::from(batch.id.clone()))
        .await
        .unwrap()
        .document;
    assert!(stored.is_minted());
    assert_eq!(
        stored.products[&unit("u1")],
        Some(mintcore::MintAddress::try_new("addr1").expect("valid address"))
    );

    // Transfers complete; settle both units.
    let settlement = TransferSettlement::new(lots.clone());
    assert_eq!(
        settlement
            .apply(&lot_key(), &unit("u1"), &order(), Timestamp::now())
            .await
            .expect("settlement succeeds"),
        1
    );
    assert_eq!(
        settlement
            .apply(&lot_key(), &unit("u2"), &order(), Timestamp::now())
            .await
            .expect("settlement succeeds"),
        1
    );

    // Replaying a settled unit is a no-op, not an error.
    assert_eq!(
        settlement
            .apply(&lot_key(), &unit("u1"), &order(), Timestamp::now())
            .await
            .expect("idempotent replay"),
        0
    );

    let lot = lots
        .get(&DocumentKey::from(lot_key()))
        .await
        .unwrap()
        .document;
    assert!(lot.stock_by_model[&model()].unit_ids.is_empty());
    assert_eq!(lot.stock_by_model[&model()].reserved_count, 0);
    assert!(lot.invariants_hold());
}

#[tokio::test]
async fn resubmission_after_success_is_rejected_before_the_chain_call() {
    let batches: InMemoryDocumentStore<MintBatch> = InMemoryDocumentStore::new();
    let minter = orchestrator(batches, OkMintClient::default());

    let batch = minter
        .create_batch(brand(), blueprint_id(), &[unit("u1")], user(), Timestamp::now())
        .await
        .expect("batch persists");
    let context = minter.load_for_minting(&batch.id).await.expect("context");
    let result = minter.submit(&context).await.expect("mint lands");
    minter
        .mark_minted(&batch.id, &result, Timestamp::now())
        .await
        .expect("mark succeeds");

    // Loading again fails fast: no second chain call is possible.
    let err = minter.load_for_minting(&batch.id).await.expect_err("terminal");
    assert!(matches!(err, CoreError::AlreadyMinted(ref id) if *id == batch.id));

    // And a duplicate mark does not alter the recorded result.
    let other = mintcore::MintResult {
        tx_signature: mintcore::TxSignature::try_new("sig2").expect("valid"),
        mint_address: mintcore::MintAddress::try_new("addr2").expect("valid"),
    };
    let err = minter
        .mark_minted(&batch.id, &other, Timestamp::now())
        .await
        .expect_err("terminal");
    assert!(matches!(err, CoreError::AlreadyMinted(_)));
}

#[tokio::test]
async fn failed_submission_leaves_the_batch_resubmittable() {
    let batches: InMemoryDocumentStore<MintBatch> = InMemoryDocumentStore::new();
    let minter = orchestrator(batches, RejectingMintClient);

    let batch = minter
        .create_batch(brand(), blueprint_id(), &[unit("u1")], user(), Timestamp::now())
        .await
        .expect("batch persists");
    let context = minter.load_for_minting(&batch.id).await.expect("context");

    let err = minter.submit(&context).await.expect_err("chain rejects");
    assert!(matches!(err, CoreError::MintFailed(_)));

    // Still unminted, so the retry boundary lets the caller go again.
    let context = minter
        .load_for_minting(&batch.id)
        .await
        .expect("still resubmittable");
    assert_eq!(context.amount, 1);
}

#[tokio::test]
async fn batch_from_inspection_deduplicates_passed_units() {
    let batches: InMemoryDocumentStore<MintBatch> = InMemoryDocumentStore::new();
    let minter = orchestrator(batches, OkMintClient::default());
    let inspection = FixedInspection {
        passed: vec![unit("p1"), unit("p1"), unit("p2")],
    };

    let batch = minter
        .create_batch_from_inspection(
            &inspection,
            &ProductionRunId::try_new("run-7").expect("valid run id"),
            brand(),
            blueprint_id(),
            user(),
            Timestamp::now(),
        )
        .await
        .expect("batch persists");

    assert_eq!(batch.products.len(), 2);
    assert!(batch.products.values().all(Option::is_none));
}

#[tokio::test]
async fn settlement_tolerates_out_of_order_delivery() {
    let lots: InMemoryDocumentStore<InventoryLot> = InMemoryDocumentStore::new();
    let coordinator = ReservationCoordinator::new(lots.clone());
    coordinator
        .upsert_units(&lot_key(), &model(), &[unit("u1")])
        .await
        .expect("stock intake succeeds");

    // The delivery notification arrives before the reservation was ever
    // observed: the unit is removed, the release is a harmless no-op,
    // and nothing goes negative.
    let settlement = TransferSettlement::new(lots.clone());
    let removed = settlement
        .apply(&lot_key(), &unit("u1"), &order(), Timestamp::now())
        .await
        .expect("settlement succeeds");

    assert_eq!(removed, 1);
    let lot = lots
        .get(&DocumentKey::from(lot_key()))
        .await
        .unwrap()
        .document;
    assert_eq!(lot.stock_by_model[&model()].reserved_count, 0);
    assert!(lot.invariants_hold());
}

#[tokio::test]
async fn order_items_reserve_through_normalized_lot_keys() {
    let lots: InMemoryDocumentStore<InventoryLot> = InMemoryDocumentStore::new();
    let coordinator = ReservationCoordinator::new(lots.clone());
    coordinator
        .upsert_units(&lot_key(), &model(), &[unit("u1"), unit("u2")])
        .await
        .expect("stock intake succeeds");

    // The catalog hands over a composite identifier; only its first two
    // segments address the lot document.
    let items = vec![mintcore::OrderItem {
        inventory_id: "hoodie_tb1_warehouse9_row3".to_string(),
        model_id: model(),
        quantity: 2,
    }];
    coordinator
        .reserve_items(&order(), &items)
        .await
        .expect("line items reserve");

    let lot = lots
        .get(&DocumentKey::from(lot_key()))
        .await
        .unwrap()
        .document;
    assert_eq!(lot.stock_by_model[&model()].reserved_by_order[&order()], 2);
}

#[tokio::test]
async fn missing_batch_is_reported_as_not_found() {
    let batches: InMemoryDocumentStore<MintBatch> = InMemoryDocumentStore::new();
    let minter = orchestrator(batches, OkMintClient::default());

    let err = minter
        .load_for_minting(&mintcore::BatchId::try_new("no-such-batch").expect("valid id"))
        .await
        .expect_err("missing batch");

    assert!(matches!(err, CoreError::NotFound { .. }));
}
