//! Builders for a small, referentially consistent source dataset.
//!
//! Available to integration tests and downstream crates through the
//! `test-utils` feature. The rows mirror the shape of the operational
//! schema: every foreign key resolves within the set.

use crate::source::MemoryDatabase;
use crate::types::{Cell, TableData, TableRow};

const SEED_TIMESTAMP: &str = "2022-11-03 14:20:49.962000";

fn ts() -> Cell {
    Cell::String(SEED_TIMESTAMP.to_string())
}

fn s(value: &str) -> Cell {
    Cell::String(value.to_string())
}

pub fn currency() -> TableData {
    TableData::with_rows(
        "currency",
        cols(&["currency_id", "currency_code", "created_at", "last_updated"]),
        vec![
            TableRow::new(vec![Cell::I64(1), s("GBP"), ts(), ts()]),
            TableRow::new(vec![Cell::I64(2), s("USD"), ts(), ts()]),
            TableRow::new(vec![Cell::I64(3), s("EUR"), ts(), ts()]),
        ],
    )
    .unwrap()
}

pub fn design() -> TableData {
    TableData::with_rows(
        "design",
        cols(&[
            "design_id",
            "design_name",
            "file_location",
            "file_name",
            "created_at",
            "last_updated",
        ]),
        vec![TableRow::new(vec![
            Cell::I64(3),
            s("Wooden"),
            s("/usr"),
            s("wooden-20220717-npgz.json"),
            ts(),
            ts(),
        ])],
    )
    .unwrap()
}

pub fn department() -> TableData {
    TableData::with_rows(
        "department",
        cols(&[
            "department_id",
            "department_name",
            "location",
            "manager",
            "created_at",
            "last_updated",
        ]),
        vec![TableRow::new(vec![
            Cell::I64(2),
            s("Purchasing"),
            s("Manchester"),
            s("Naomi Lapaglia"),
            ts(),
            ts(),
        ])],
    )
    .unwrap()
}

pub fn staff() -> TableData {
    TableData::with_rows(
        "staff",
        cols(&[
            "staff_id",
            "first_name",
            "last_name",
            "department_id",
            "email_address",
            "created_at",
            "last_updated",
        ]),
        vec![TableRow::new(vec![
            Cell::I64(19),
            s("Jeremie"),
            s("Franey"),
            Cell::I64(2),
            s("jeremie.franey@terrifictotes.com"),
            ts(),
            ts(),
        ])],
    )
    .unwrap()
}

pub fn address() -> TableData {
    TableData::with_rows(
        "address",
        cols(&[
            "address_id",
            "address_line_1",
            "address_line_2",
            "district",
            "city",
            "postal_code",
            "country",
            "phone",
            "created_at",
            "last_updated",
        ]),
        vec![
            TableRow::new(vec![
                Cell::I64(8),
                s("6826 Herzog Via"),
                Cell::Null,
                s("Avon"),
                s("New Patienceburgh"),
                s("28441"),
                s("Turkey"),
                s("1803 637401"),
                ts(),
                ts(),
            ]),
            TableRow::new(vec![
                Cell::I64(15),
                s("605 Haskell Trafficway"),
                s("Axel Freeway"),
                Cell::Null,
                s("East Bobbie"),
                s("88253-4257"),
                s("Heard Island and McDonald Islands"),
                s("9687 937447"),
                ts(),
                ts(),
            ]),
        ],
    )
    .unwrap()
}

pub fn counterparty() -> TableData {
    TableData::with_rows(
        "counterparty",
        cols(&[
            "counterparty_id",
            "counterparty_legal_name",
            "legal_address_id",
            "commercial_contact",
            "delivery_contact",
            "created_at",
            "last_updated",
        ]),
        vec![TableRow::new(vec![
            Cell::I64(8),
            s("Fahey and Sons"),
            Cell::I64(15),
            s("Micheal Toy"),
            s("Mrs. Lucy Runolfsdottir"),
            ts(),
            ts(),
        ])],
    )
    .unwrap()
}

pub fn sales_order() -> TableData {
    TableData::with_rows(
        "sales_order",
        cols(&[
            "sales_order_id",
            "created_at",
            "last_updated",
            "design_id",
            "staff_id",
            "counterparty_id",
            "units_sold",
            "unit_price",
            "currency_id",
            "agreed_delivery_date",
            "agreed_payment_date",
            "agreed_delivery_location_id",
        ]),
        vec![TableRow::new(vec![
            Cell::I64(2),
            ts(),
            ts(),
            Cell::I64(3),
            Cell::I64(19),
            Cell::I64(8),
            Cell::I64(42972),
            Cell::F64(3.94),
            Cell::I64(2),
            s("2022-11-07"),
            s("2022-11-08"),
            Cell::I64(8),
        ])],
    )
    .unwrap()
}

pub fn purchase_order() -> TableData {
    TableData::with_rows(
        "purchase_order",
        cols(&[
            "purchase_order_id",
            "created_at",
            "last_updated",
            "staff_id",
            "counterparty_id",
            "item_code",
            "item_quantity",
            "item_unit_price",
            "currency_id",
            "agreed_delivery_date",
            "agreed_payment_date",
            "agreed_delivery_location_id",
        ]),
        vec![TableRow::new(vec![
            Cell::I64(1),
            ts(),
            ts(),
            Cell::I64(19),
            Cell::I64(8),
            s("ZDOI5EA"),
            Cell::I64(371),
            Cell::F64(361.36),
            Cell::I64(2),
            s("2022-11-09"),
            s("2022-11-07"),
            Cell::I64(15),
        ])],
    )
    .unwrap()
}

/// Every operational table the transforms consume.
pub fn all_tables() -> Vec<TableData> {
    vec![
        currency(),
        design(),
        department(),
        staff(),
        address(),
        counterparty(),
        sales_order(),
        purchase_order(),
    ]
}

/// A [`MemoryDatabase`] seeded with the full dataset.
pub async fn seeded_database() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    for table in all_tables() {
        db.insert_table(table).await;
    }
    db
}

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}
