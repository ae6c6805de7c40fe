use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

use rotu_core::documents::{QuotationItemInput, SaleItemInput};
use rotu_core::domain::client::{Client, ClientInput};
use rotu_core::domain::expense::ExpenseInput;
use rotu_core::domain::inventory::{CategoryInput, Product, ProductInput, StockMovementInput, UnitMeasure};
use rotu_core::domain::quotation::{QuotationInput, QuotationStatus};
use rotu_core::domain::sale::{PaymentMethod, SaleFromQuotation, SaleInput, SaleStatus};
use rotu_core::domain::simple_inventory::{SimpleProductInput, StockAdjustment};
use rotu_core::errors::DomainError;
use rotu_core::stock::{MovementKind, SimpleMovementKind};
use rotu_db::repositories::{
    ClientRepository, DateRange, ExpenseFilter, ExpenseRepository, InventoryRepository,
    MovementFilter, QuotationRepository, ReportRepository, RepositoryError, SaleRepository,
    SimpleInventoryRepository, SqlClientRepository, SqlExpenseRepository, SqlInventoryRepository,
    SqlQuotationRepository, SqlReportRepository, SqlSaleRepository, SqlSimpleInventoryRepository,
};
use rotu_db::{connect_with_settings, migrations, DbPool};

struct TestDb {
    pool: DbPool,
    _dir: TempDir,
}

async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("rotu.db").display());
    let pool = connect_with_settings(&url, 2, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    TestDb { pool, _dir: dir }
}

fn tax_rate() -> Decimal {
    Decimal::new(15, 0)
}

async fn client(pool: &DbPool, name: &str) -> Client {
    SqlClientRepository::new(pool.clone())
        .create(&ClientInput {
            name: name.to_string(),
            company: String::new(),
            phone: "9999-0000".to_string(),
            email: String::new(),
            address: String::new(),
            rtn: String::new(),
            notes: String::new(),
            is_active: true,
        })
        .await
        .expect("client")
}

async fn vinyl(pool: &DbPool, quantity: Decimal) -> Product {
    let inventory = SqlInventoryRepository::new(pool.clone());
    let category = inventory
        .create_category(&CategoryInput { name: "Viniles".to_string(), description: String::new() })
        .await
        .expect("category");
    inventory
        .create_product(&ProductInput {
            name: "Vinil blanco".to_string(),
            sku: None,
            category_id: category.id,
            description: String::new(),
            unit_measure: UnitMeasure::Sqin,
            quantity_available: quantity,
            unit_cost: Decimal::new(5, 2),
            unit_price: Decimal::new(10, 0),
            price_per_square_inch: Decimal::new(10, 0),
            supplier: String::new(),
            minimum_stock: Decimal::new(10, 0),
            is_active: true,
        })
        .await
        .expect("product")
}

fn quotation_input(client: &Client, product: &Product, discount: Decimal) -> QuotationInput {
    QuotationInput {
        client_id: client.id,
        discount_percentage: Some(discount),
        apply_tax: None,
        tax_rate: None,
        notes: Some("Rotulo fachada".to_string()),
        valid_until: None,
        items: Some(vec![QuotationItemInput {
            product_id: product.id,
            description: "Vinil impreso".to_string(),
            width_inches: Decimal::new(2, 0),
            height_inches: Decimal::new(3, 0),
            price_per_square_inch: Decimal::new(10, 0),
            quantity: 2,
        }]),
    }
}

fn sale_input(client: &Client, product: &Product, quantity_used: Decimal) -> SaleInput {
    SaleInput {
        client_id: client.id,
        quotation_id: None,
        payment_method: Some(PaymentMethod::Cash),
        discount_percentage: None,
        tax_rate: None,
        notes: None,
        items: Some(vec![SaleItemInput {
            product_id: product.id,
            description: "Banner".to_string(),
            width_inches: Decimal::ZERO,
            height_inches: Decimal::ZERO,
            unit_price: Decimal::new(500, 0),
            quantity: 2,
            quantity_used,
        }]),
    }
}

#[tokio::test]
async fn quotation_numbers_increase_and_totals_follow_items() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let quotations = SqlQuotationRepository::new(db.pool.clone());

    let draft = quotation_input(&customer, &product, Decimal::new(10, 0))
        .into_draft(tax_rate())
        .expect("draft");
    let first = quotations.create(&draft, None).await.expect("first quotation");
    let second = quotations.create(&draft, None).await.expect("second quotation");

    assert_eq!(first.quotation_number, "COT-000001");
    assert_eq!(second.quotation_number, "COT-000002");
    assert_eq!(first.status, QuotationStatus::Pending);
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].line.total, Decimal::new(120, 0));
    assert_eq!(first.totals.subtotal, Decimal::new(120, 0));
    assert_eq!(first.totals.total_amount, Decimal::new(108, 0));
    assert_eq!(first.client_name, "Ana Lopez");
}

#[tokio::test]
async fn item_writes_recompute_the_parent_quotation() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let quotations = SqlQuotationRepository::new(db.pool.clone());

    let draft = quotation_input(&customer, &product, Decimal::ZERO)
        .into_draft(tax_rate())
        .expect("draft");
    let quotation = quotations.create(&draft, None).await.expect("quotation");

    let extra = draft.lines[0].clone();
    let added = quotations.add_item(quotation.id, &extra).await.expect("add item");
    let reloaded = quotations.find_by_id(quotation.id).await.expect("find").expect("present");
    assert_eq!(reloaded.items.len(), 2);
    assert_eq!(reloaded.totals.total_amount, Decimal::new(240, 0));

    quotations.delete_item(added.id).await.expect("delete item");
    let reloaded = quotations.find_by_id(quotation.id).await.expect("find").expect("present");
    assert_eq!(reloaded.totals.total_amount, Decimal::new(120, 0));

    let replaced = quotations.update(quotation.id, &draft).await.expect("replace items");
    assert_eq!(replaced.totals, reloaded.totals);
}

#[tokio::test]
async fn converting_a_quotation_creates_a_sale_once() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let quotations = SqlQuotationRepository::new(db.pool.clone());
    let sales = SqlSaleRepository::new(db.pool.clone());

    let draft = quotation_input(&customer, &product, Decimal::ZERO)
        .into_draft(tax_rate())
        .expect("draft");
    let quotation = quotations.create(&draft, None).await.expect("quotation");
    quotations.transition(quotation.id, QuotationStatus::Approved).await.expect("approve");

    let request = SaleFromQuotation {
        quotation_id: quotation.id,
        payment_method: PaymentMethod::Transfer,
        notes: None,
    };
    let sale = sales.create_from_quotation(&request, tax_rate(), None).await.expect("convert");
    assert_eq!(sale.invoice_number, "FAC-000001");
    assert_eq!(sale.quotation_id, Some(quotation.id));
    assert_eq!(sale.status, SaleStatus::Pending);
    assert_eq!(sale.items.len(), 1);
    assert_eq!(sale.totals.subtotal, Decimal::new(120, 0));
    assert_eq!(sale.totals.total_amount, Decimal::new(138, 0));

    let converted = quotations.find_by_id(quotation.id).await.expect("find").expect("present");
    assert_eq!(converted.status, QuotationStatus::Converted);

    let again = sales.create_from_quotation(&request, tax_rate(), None).await;
    assert!(matches!(again, Err(RepositoryError::Domain(DomainError::BusinessRule(_)))));

    let reapprove = quotations.transition(quotation.id, QuotationStatus::Approved).await;
    assert!(matches!(
        reapprove,
        Err(RepositoryError::Domain(DomainError::InvalidQuotationTransition { .. }))
    ));
}

#[tokio::test]
async fn completing_a_sale_draws_stock_once() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let sales = SqlSaleRepository::new(db.pool.clone());
    let inventory = SqlInventoryRepository::new(db.pool.clone());

    let draft = sale_input(&customer, &product, Decimal::new(5, 0)).into_draft(tax_rate()).expect("draft");
    let sale = sales.create(&draft, None).await.expect("sale");
    assert_eq!(sale.totals.tax_amount, Decimal::new(150, 0));
    assert_eq!(sale.totals.total_amount, Decimal::new(1150, 0));

    let completed = sales.complete(sale.id, None, Utc::now()).await.expect("complete");
    assert_eq!(completed.status, SaleStatus::Completed);
    assert!(completed.completed_at.is_some());

    let stocked = inventory.find_product(product.id).await.expect("find").expect("present");
    assert_eq!(stocked.quantity_available, Decimal::new(95, 0));

    let movements = inventory
        .list_movements(&MovementFilter { product_id: Some(product.id), movement_type: None })
        .await
        .expect("movements");
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementKind::Exit);
    assert_eq!(movements[0].reference, sale.invoice_number);
    assert_eq!(movements[0].notes, "Venta - Banner");

    let again = sales.complete(sale.id, None, Utc::now()).await;
    assert!(matches!(again, Err(RepositoryError::Domain(DomainError::BusinessRule(_)))));
    let cancel = sales.cancel(sale.id).await;
    assert!(matches!(cancel, Err(RepositoryError::Domain(DomainError::BusinessRule(_)))));

    let stocked = inventory.find_product(product.id).await.expect("find").expect("present");
    assert_eq!(stocked.quantity_available, Decimal::new(95, 0));
}

#[tokio::test]
async fn lines_without_material_record_no_exit() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let sales = SqlSaleRepository::new(db.pool.clone());
    let inventory = SqlInventoryRepository::new(db.pool.clone());

    let draft = sale_input(&customer, &product, Decimal::ZERO).into_draft(tax_rate()).expect("draft");
    let sale = sales.create(&draft, None).await.expect("sale");
    sales.complete(sale.id, None, Utc::now()).await.expect("complete");

    let movements = inventory.list_movements(&MovementFilter::default()).await.expect("movements");
    assert!(movements.is_empty());
}

#[tokio::test]
async fn referenced_clients_cannot_be_deleted() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let idle = client(&db.pool, "Sin compras").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let clients = SqlClientRepository::new(db.pool.clone());
    let sales = SqlSaleRepository::new(db.pool.clone());

    let draft = sale_input(&customer, &product, Decimal::ZERO).into_draft(tax_rate()).expect("draft");
    sales.create(&draft, None).await.expect("sale");

    let refused = clients.delete(customer.id).await;
    assert!(matches!(refused, Err(RepositoryError::Conflict(_))));
    clients.delete(idle.id).await.expect("unreferenced client is deleted");
}

#[tokio::test]
async fn manual_adjustments_never_overdraw() {
    let db = test_db().await;
    let repository = SqlSimpleInventoryRepository::new(db.pool.clone());
    let product = repository
        .create_product(
            &SimpleProductInput {
                name: "Ojetes".to_string(),
                sku: None,
                description: String::new(),
                quantity: 10,
            },
            None,
        )
        .await
        .expect("simple product");
    assert!(product.sku.starts_with("INV-"));

    let (updated, movement) = repository
        .adjust_stock(product.id, &StockAdjustment { quantity: -4, notes: String::new() }, None)
        .await
        .expect("withdraw");
    assert_eq!(updated.quantity, 6);
    assert_eq!(movement.movement_type, SimpleMovementKind::Exit);
    assert_eq!(movement.quantity, 4);
    assert_eq!(movement.notes, "Ajuste de inventario");

    let overdraw = repository
        .adjust_stock(product.id, &StockAdjustment { quantity: -7, notes: String::new() }, None)
        .await;
    assert!(matches!(overdraw, Err(RepositoryError::Domain(DomainError::BusinessRule(_)))));

    let unchanged = repository.find_product(product.id).await.expect("find").expect("present");
    assert_eq!(unchanged.quantity, 6);
}

#[tokio::test]
async fn expenses_filter_by_inclusive_date_range() {
    let db = test_db().await;
    let expenses = SqlExpenseRepository::new(db.pool.clone());
    let day = |d: u32| NaiveDate::from_ymd_opt(2024, 5, d).expect("date");

    let mut ids = Vec::new();
    for (d, amount) in [(1, 100), (15, 250), (31, 75)] {
        let expense = expenses
            .create(
                &ExpenseInput {
                    description: format!("Gasto {d}"),
                    date: day(d),
                    amount: Decimal::new(amount, 0),
                },
                None,
            )
            .await
            .expect("expense");
        ids.push(expense.id);
    }

    let filtered = expenses
        .list(&ExpenseFilter { start_date: Some(day(1)), end_date: Some(day(15)), search: None })
        .await
        .expect("list");
    assert_eq!(filtered.len(), 2);
    assert_eq!(filtered[0].date, day(15));

    let deleted = expenses.delete_many(&ids[..2]).await.expect("bulk delete");
    assert_eq!(deleted, 2);
    assert_eq!(expenses.list(&ExpenseFilter::default()).await.expect("list").len(), 1);
}

#[tokio::test]
async fn report_facts_only_count_completed_sales() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let sales = SqlSaleRepository::new(db.pool.clone());
    let reports = SqlReportRepository::new(db.pool.clone());

    let draft = sale_input(&customer, &product, Decimal::ZERO).into_draft(tax_rate()).expect("draft");
    let done = sales.create(&draft, None).await.expect("sale");
    sales.create(&draft, None).await.expect("pending sale");
    sales.complete(done.id, None, Utc::now()).await.expect("complete");

    assert_eq!(reports.sale_facts().await.expect("facts").len(), 2);

    let completed = reports.completed_sale_facts(&DateRange::default()).await.expect("completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].total_amount, Decimal::new(1150, 0));

    let items = reports.completed_item_facts(&DateRange::default()).await.expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_name, "Vinil blanco");

    let yesterday = Utc::now().date_naive().pred_opt().expect("date");
    let past = DateRange { start: None, end: Some(yesterday) };
    assert!(reports.completed_sale_facts(&past).await.expect("range").is_empty());
}

async fn concurrent_db(max_connections: u32) -> TestDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("rotu.db").display());
    let pool = connect_with_settings(&url, max_connections, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    TestDb { pool, _dir: dir }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_quotations_get_distinct_consecutive_numbers() {
    let db = concurrent_db(8).await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let draft = quotation_input(&customer, &product, Decimal::ZERO).into_draft(tax_rate()).expect("draft");

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let quotations = SqlQuotationRepository::new(db.pool.clone());
            let draft = draft.clone();
            tokio::spawn(async move { quotations.create(&draft, None).await })
        })
        .collect();

    let mut numbers = Vec::new();
    for task in tasks {
        let quotation = task.await.expect("join").expect("every concurrent create succeeds");
        numbers.push(quotation.quotation_number);
    }
    numbers.sort();
    let expected: Vec<String> = (1..=16).map(|n| format!("COT-{n:06}")).collect();
    assert_eq!(numbers, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stock_entries_are_all_applied() {
    let db = concurrent_db(8).await;
    let product = vinyl(&db.pool, Decimal::new(10, 0)).await;

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let inventory = SqlInventoryRepository::new(db.pool.clone());
            let input = StockMovementInput {
                product_id: product.id,
                movement_type: MovementKind::Entry,
                quantity: Decimal::new(5, 0),
                reference: String::new(),
                notes: String::new(),
            };
            tokio::spawn(async move { inventory.record_movement(&input, None).await })
        })
        .collect();
    for task in tasks {
        task.await.expect("join").expect("movement");
    }

    let reloaded = SqlInventoryRepository::new(db.pool.clone())
        .find_product(product.id)
        .await
        .expect("find")
        .expect("present");
    assert_eq!(reloaded.quantity_available, Decimal::new(70, 0));
}

#[tokio::test]
async fn exhausted_number_attempts_surface_as_a_conflict() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;

    // The newest row says 000001, so every attempt derives 000002, which is already taken.
    for number in ["COT-000002", "COT-000001"] {
        sqlx::query(
            "INSERT INTO quotations (quotation_number, client_id, created_at, updated_at)
             VALUES (?, ?, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .bind(number)
        .bind(customer.id.0)
        .execute(&db.pool)
        .await
        .expect("seed quotation");
    }

    let draft = quotation_input(&customer, &product, Decimal::ZERO).into_draft(tax_rate()).expect("draft");
    let error = SqlQuotationRepository::new(db.pool.clone())
        .create(&draft, None)
        .await
        .expect_err("number is never free");
    assert!(matches!(error, RepositoryError::Conflict(ref message) if message.contains("attempts")), "{error:?}");
}

#[tokio::test]
async fn header_only_sale_update_keeps_stored_percentages() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let sales = SqlSaleRepository::new(db.pool.clone());

    let mut input = sale_input(&customer, &product, Decimal::ZERO);
    input.payment_method = Some(PaymentMethod::Transfer);
    input.discount_percentage = Some(Decimal::new(10, 0));
    input.tax_rate = Some(Decimal::ZERO);
    let sale = sales.create(&input.into_draft(tax_rate()).expect("draft"), None).await.expect("sale");
    assert_eq!(sale.totals.total_amount, Decimal::new(900, 0));

    let notes_only = SaleInput {
        client_id: customer.id,
        quotation_id: None,
        payment_method: None,
        discount_percentage: None,
        tax_rate: None,
        notes: Some("entregar lunes".to_string()),
        items: None,
    };
    let updated = sales
        .update(sale.id, &notes_only.into_replacement(&sale).expect("replacement"))
        .await
        .expect("update");

    assert_eq!(updated.notes, "entregar lunes");
    assert_eq!(updated.payment_method, PaymentMethod::Transfer);
    assert_eq!(updated.tax_rate, Decimal::ZERO);
    assert_eq!(updated.totals, sale.totals);
    assert_eq!(updated.items.len(), 1);
}

#[tokio::test]
async fn approving_twice_leaves_the_quotation_untouched() {
    let db = test_db().await;
    let customer = client(&db.pool, "Ana Lopez").await;
    let product = vinyl(&db.pool, Decimal::new(100, 0)).await;
    let quotations = SqlQuotationRepository::new(db.pool.clone());

    let draft = quotation_input(&customer, &product, Decimal::ZERO).into_draft(tax_rate()).expect("draft");
    let quotation = quotations.create(&draft, None).await.expect("quotation");
    let approved = quotations.transition(quotation.id, QuotationStatus::Approved).await.expect("approve");

    let again = quotations.transition(quotation.id, QuotationStatus::Approved).await.expect("approve again");
    assert_eq!(again.status, QuotationStatus::Approved);
    assert_eq!(again.updated_at, approved.updated_at);

    quotations.transition(quotation.id, QuotationStatus::Rejected).await.expect("reject");
    let rejected = quotations.transition(quotation.id, QuotationStatus::Rejected).await.expect("reject again");
    assert_eq!(rejected.status, QuotationStatus::Rejected);
}
