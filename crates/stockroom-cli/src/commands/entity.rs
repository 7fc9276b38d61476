use serde_json::{Map, Value};
use stockroom_core::models::{
    Collection, CustomerDraft, ExpenseDraft, ProductDraft, Record, SaleDraft, SaleItemDraft,
};
use stockroom_core::LocalStore;

use crate::cli::{CustomerCommands, ExpenseCommands, ProductCommands, SaleCommands};
use crate::commands::common::{
    format_record_lines, normalize_identifier, parse_assignment, parse_sale_item, record_title,
    Settings,
};
use crate::error::CliError;

pub async fn run_product(command: ProductCommands, settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    match command {
        ProductCommands::Add {
            name,
            barcode,
            buy_price,
            sell_price,
            stock_qty,
        } => {
            let fields = ProductDraft {
                name,
                barcode,
                buy_price,
                sell_price,
                stock_qty,
            }
            .into_fields()?;
            let record = store.create(Collection::Products, fields).await?;
            print_saved("Added", Collection::Products, &record);
        }
        ProductCommands::Update {
            id,
            name,
            barcode,
            buy_price,
            sell_price,
            stock_qty,
            extra,
        } => {
            let mut changes = collect_assignments(&extra)?;
            insert_some(&mut changes, "name", name.map(Value::from));
            insert_some(&mut changes, "barcode", barcode.map(Value::from));
            insert_some(&mut changes, "buy_price", buy_price.map(Value::from));
            insert_some(&mut changes, "sell_price", sell_price.map(Value::from));
            insert_some(&mut changes, "stock_qty", stock_qty.map(Value::from));
            update(&store, Collection::Products, &id, changes).await?;
        }
    }
    Ok(())
}

pub async fn run_customer(command: CustomerCommands, settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    match command {
        CustomerCommands::Add { full_name, phone } => {
            let fields = CustomerDraft { full_name, phone }.into_fields()?;
            let record = store.create(Collection::Customers, fields).await?;
            print_saved("Added", Collection::Customers, &record);
        }
        CustomerCommands::Update {
            id,
            full_name,
            phone,
            extra,
        } => {
            let mut changes = collect_assignments(&extra)?;
            insert_some(&mut changes, "full_name", full_name.map(Value::from));
            insert_some(&mut changes, "phone", phone.map(Value::from));
            update(&store, Collection::Customers, &id, changes).await?;
        }
    }
    Ok(())
}

pub async fn run_sale(command: SaleCommands, settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    match command {
        SaleCommands::Add {
            items,
            payment,
            seller,
            customer,
        } => {
            let mut lines = Vec::with_capacity(items.len());
            for raw in &items {
                let (product, quantity, price) = parse_sale_item(raw)?;
                let price = match price {
                    Some(price) => price,
                    None => product_sell_price(&store, &product).await?,
                };
                lines.push(SaleItemDraft {
                    product,
                    quantity,
                    price,
                });
            }

            let fields = SaleDraft {
                payment_type: payment.into(),
                seller,
                customer,
                items: lines,
            }
            .into_fields()?;
            let record = store.create(Collection::Sales, fields).await?;
            print_saved("Recorded", Collection::Sales, &record);
        }
    }
    Ok(())
}

pub async fn run_expense(command: ExpenseCommands, settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    match command {
        ExpenseCommands::Add {
            amount,
            category,
            note,
        } => {
            let fields = ExpenseDraft {
                category,
                amount,
                note,
            }
            .into_fields()?;
            let record = store.create(Collection::Expenses, fields).await?;
            print_saved("Recorded", Collection::Expenses, &record);
        }
    }
    Ok(())
}

pub async fn run_list(
    collection: Collection,
    limit: usize,
    as_json: bool,
    settings: &Settings,
) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    let mut records = store.list(collection).await?;
    records.truncate(limit);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No {collection} stored locally.");
        return Ok(());
    }
    for line in format_record_lines(collection, &records) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_get(collection: Collection, id: &str, settings: &Settings) -> Result<(), CliError> {
    let id = normalize_identifier(id)?;
    let store = settings.open_store().await?;
    let record = store
        .get(collection, &id)
        .await?
        .ok_or_else(|| CliError::NotFound(format!("{collection}/{id}")))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn run_delete(collection: Collection, id: &str, settings: &Settings) -> Result<(), CliError> {
    let id = normalize_identifier(id)?;
    let store = settings.open_store().await?;
    store.remove(collection, &id).await?;
    println!("Deleted {collection}/{id}");
    Ok(())
}

async fn update(
    store: &LocalStore,
    collection: Collection,
    id: &str,
    changes: Map<String, Value>,
) -> Result<(), CliError> {
    let id = normalize_identifier(id)?;
    if changes.is_empty() {
        return Err(CliError::InvalidArgument("nothing to update".to_string()));
    }
    let record = store.update(collection, &id, changes).await?;
    print_saved("Updated", collection, &record);
    Ok(())
}

async fn product_sell_price(store: &LocalStore, product_id: &str) -> Result<f64, CliError> {
    let product = store
        .get(Collection::Products, product_id)
        .await?
        .ok_or_else(|| CliError::NotFound(format!("products/{product_id}")))?;
    Ok(product
        .field("sell_price")
        .and_then(Value::as_f64)
        .unwrap_or(0.0))
}

pub fn collect_assignments(raw: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut changes = Map::new();
    for assignment in raw {
        let (key, value) = parse_assignment(assignment)?;
        changes.insert(key, value);
    }
    Ok(changes)
}

fn insert_some(changes: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        changes.insert(key.to_string(), value);
    }
}

fn print_saved(verb: &str, collection: Collection, record: &Record) {
    println!(
        "{verb} {collection}/{} v{}: {}",
        record.id,
        record.version,
        record_title(collection, record)
    );
}
