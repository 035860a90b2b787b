//! Per-entity rules mapping operational snapshots onto the star schema.
//!
//! Each rule is a [`super::TransformFn`]: it receives the staged inputs in
//! registry order and produces the warehouse-ready table. The rules are pure
//! over their inputs, which keeps them unit-testable without a store.

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::staging::RunContext;
use crate::types::{Cell, TableData};

use super::TransformOutput;

/// Audit columns carried by every operational table and dropped from every
/// dimension.
const AUDIT_COLUMNS: [&str; 2] = ["created_at", "last_updated"];

/// Display names for the currency codes the source actually trades in.
const CURRENCY_NAMES: [(&str, &str); 3] = [
    ("GBP", "Pounds"),
    ("USD", "US dollars"),
    ("EUR", "Euros"),
];

/// `dim_currency`: audit columns dropped, display name derived from the code.
pub fn currency(_run: &RunContext, inputs: &[TableData]) -> PipelineResult<TransformOutput> {
    let mut table = inputs[0].clone();
    table.drop_columns(&AUDIT_COLUMNS)?;

    let code = table.require_column("currency_code")?;
    let names: Vec<Cell> = table
        .rows()
        .iter()
        .map(|row| Cell::String(currency_name(&row.values()[code].to_string()).to_string()))
        .collect();
    table.add_column("currency_name", names)?;

    let mut table = table.select(&["currency_id", "currency_code", "currency_name"])?;
    table.set_name("dim_currency");
    Ok(TransformOutput::Table(table))
}

/// Unknown codes are flagged rather than failing the run; a new trading
/// currency should not block every other entity.
fn currency_name(code: &str) -> &str {
    CURRENCY_NAMES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
        .unwrap_or("unknown currency")
}

/// `dim_design`: the design snapshot minus audit columns.
pub fn design(_run: &RunContext, inputs: &[TableData]) -> PipelineResult<TransformOutput> {
    let mut table = inputs[0].clone();
    table.drop_columns(&AUDIT_COLUMNS)?;

    let mut table = table.select(&["design_id", "design_name", "file_location", "file_name"])?;
    table.set_name("dim_design");
    Ok(TransformOutput::Table(table))
}

/// `dim_staff`: staff joined to department by `department_id`, denormalizing
/// the department name and location onto each staff row.
pub fn staff(_run: &RunContext, inputs: &[TableData]) -> PipelineResult<TransformOutput> {
    let mut table = inputs[0].clone();
    let department = &inputs[1];

    let by_id = department.index_by("department_id")?;
    let name = department.require_column("department_name")?;
    let location = department.require_column("location")?;

    let department_id = table.require_column("department_id")?;
    let mut names = Vec::with_capacity(table.len());
    let mut locations = Vec::with_capacity(table.len());
    for (position, row) in table.rows().iter().enumerate() {
        let dept = lookup(&by_id, &row.values()[department_id], "staff", "department_id", position)?;
        names.push(department.value(dept, name).clone());
        locations.push(department.value(dept, location).clone());
    }
    table.add_column("department_name", names)?;
    table.add_column("location", locations)?;

    let mut table = table.select(&[
        "staff_id",
        "first_name",
        "last_name",
        "department_name",
        "location",
        "email_address",
    ])?;
    table.set_name("dim_staff");
    Ok(TransformOutput::Table(table))
}

/// `dim_location`: the address snapshot with the identifier renamed and
/// leading.
pub fn location(_run: &RunContext, inputs: &[TableData]) -> PipelineResult<TransformOutput> {
    let mut table = inputs[0].clone();
    table.drop_columns(&AUDIT_COLUMNS)?;
    table.rename_column("address_id", "location_id")?;

    let mut table = table.select(&[
        "location_id",
        "address_line_1",
        "address_line_2",
        "district",
        "city",
        "postal_code",
        "country",
        "phone",
    ])?;
    table.set_name("dim_location");
    Ok(TransformOutput::Table(table))
}

/// `dim_counterparty`: counterparty joined to address by `legal_address_id`,
/// denormalizing the legal address under the `counterparty_legal_*` names.
pub fn counterparty(_run: &RunContext, inputs: &[TableData]) -> PipelineResult<TransformOutput> {
    let mut table = inputs[0].clone();
    let address = &inputs[1];

    let by_id = address.index_by("address_id")?;
    let sources = [
        ("address_line_1", "counterparty_legal_address_line_1"),
        ("address_line_2", "counterparty_legal_address_line_2"),
        ("district", "counterparty_legal_district"),
        ("city", "counterparty_legal_city"),
        ("postal_code", "counterparty_legal_postal_code"),
        ("country", "counterparty_legal_country"),
        ("phone", "counterparty_legal_phone_number"),
    ];

    let legal_address_id = table.require_column("legal_address_id")?;
    let mut rows = Vec::with_capacity(table.len());
    for (position, row) in table.rows().iter().enumerate() {
        rows.push(lookup(
            &by_id,
            &row.values()[legal_address_id],
            "counterparty",
            "legal_address_id",
            position,
        )?);
    }

    for (source, target) in sources {
        let index = address.require_column(source)?;
        let values = rows.iter().map(|row| address.value(*row, index).clone()).collect();
        table.add_column(target, values)?;
    }

    let mut table = table.select(&[
        "counterparty_id",
        "counterparty_legal_name",
        "counterparty_legal_address_line_1",
        "counterparty_legal_address_line_2",
        "counterparty_legal_district",
        "counterparty_legal_city",
        "counterparty_legal_postal_code",
        "counterparty_legal_country",
        "counterparty_legal_phone_number",
    ])?;
    table.set_name("dim_counterparty");
    Ok(TransformOutput::Table(table))
}

/// `fact_sales_order`: temporal split, sales-specific staff key, synthetic
/// per-row record identifier.
pub fn sales_order(_run: &RunContext, inputs: &[TableData]) -> PipelineResult<TransformOutput> {
    let mut table = inputs[0].clone();

    split_timestamp(&mut table, "created_at", "created_date", "created_time")?;
    split_timestamp(&mut table, "last_updated", "last_updated_date", "last_updated_time")?;
    table.rename_column("staff_id", "sales_staff_id")?;

    let records = (1..=table.len() as i64).map(Cell::I64).collect();
    table.add_column("sales_record_id", records)?;

    let mut table = table.select(&[
        "sales_record_id",
        "sales_order_id",
        "created_date",
        "created_time",
        "last_updated_date",
        "last_updated_time",
        "sales_staff_id",
        "counterparty_id",
        "units_sold",
        "unit_price",
        "currency_id",
        "design_id",
        "agreed_payment_date",
        "agreed_delivery_date",
        "agreed_delivery_location_id",
    ])?;
    table.set_name("fact_sales_order");
    Ok(TransformOutput::Table(table))
}

/// `fact_purchase_order`: same temporal treatment as sales with the
/// supplier-side column projection.
pub fn purchase_order(_run: &RunContext, inputs: &[TableData]) -> PipelineResult<TransformOutput> {
    let mut table = inputs[0].clone();

    split_timestamp(&mut table, "created_at", "created_date", "created_time")?;
    split_timestamp(&mut table, "last_updated", "last_updated_date", "last_updated_time")?;

    let records = (1..=table.len() as i64).map(Cell::I64).collect();
    table.add_column("purchase_record_id", records)?;

    let mut table = table.select(&[
        "purchase_record_id",
        "purchase_order_id",
        "created_date",
        "created_time",
        "last_updated_date",
        "last_updated_time",
        "staff_id",
        "counterparty_id",
        "item_code",
        "item_quantity",
        "item_unit_price",
        "currency_id",
        "agreed_delivery_date",
        "agreed_payment_date",
        "agreed_delivery_location_id",
    ])?;
    table.set_name("fact_purchase_order");
    Ok(TransformOutput::Table(table))
}

/// Splits a combined timestamp column into separate date and time columns and
/// drops the original.
fn split_timestamp(
    table: &mut TableData,
    source: &str,
    date_column: &str,
    time_column: &str,
) -> PipelineResult<()> {
    let index = table.require_column(source)?;

    let mut dates = Vec::with_capacity(table.len());
    let mut times = Vec::with_capacity(table.len());
    for (position, row) in table.rows().iter().enumerate() {
        let timestamp = row.values()[index].as_timestamp().ok_or_else(|| {
            pipeline_error!(
                ErrorKind::MalformedInput,
                "combined timestamp column is not a timestamp",
                format!("table `{}`, column `{source}`, row {position}", table.name())
            )
        })?;
        dates.push(Cell::Date(timestamp.date()));
        times.push(Cell::Time(timestamp.time()));
    }

    table.add_column(date_column, dates)?;
    table.add_column(time_column, times)?;
    table.drop_columns(&[source])
}

/// Resolves a foreign key against a join index built by
/// [`TableData::index_by`].
fn lookup(
    index: &std::collections::HashMap<i64, usize>,
    key: &Cell,
    table: &str,
    column: &str,
    position: usize,
) -> PipelineResult<usize> {
    let id = key.as_i64().ok_or_else(|| {
        pipeline_error!(
            ErrorKind::MalformedInput,
            "foreign key is not an integer",
            format!("table `{table}`, column `{column}`, row {position}")
        )
    })?;
    index.get(&id).copied().ok_or_else(|| {
        pipeline_error!(
            ErrorKind::MalformedInput,
            "foreign key does not resolve",
            format!("table `{table}`, column `{column}`, row {position} references {id}")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableRow;

    fn run() -> RunContext {
        RunContext::Bootstrap
    }

    fn unwrap_table(output: TransformOutput) -> TableData {
        match output {
            TransformOutput::Table(table) => table,
            TransformOutput::AlreadyCurrent => panic!("expected a table"),
        }
    }

    fn currency_snapshot() -> TableData {
        TableData::with_rows(
            "currency",
            vec![
                "currency_id".into(),
                "currency_code".into(),
                "created_at".into(),
                "last_updated".into(),
            ],
            ["GBP", "USD", "EUR", "XTS"]
                .into_iter()
                .enumerate()
                .map(|(index, code)| {
                    TableRow::new(vec![
                        Cell::I64(index as i64 + 1),
                        Cell::String(code.into()),
                        Cell::String("2022-11-03 14:20:49.962000".into()),
                        Cell::String("2022-11-03 14:20:49.962000".into()),
                    ])
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn currency_maps_codes_and_flags_unknown_ones() {
        let table = unwrap_table(currency(&run(), &[currency_snapshot()]).unwrap());

        assert_eq!(
            table.columns(),
            &["currency_id", "currency_code", "currency_name"]
        );
        for (row, name) in ["Pounds", "US dollars", "Euros"].into_iter().enumerate() {
            assert_eq!(table.value(row, 2), &Cell::String(name.into()));
        }
        assert_eq!(table.value(3, 2), &Cell::String("unknown currency".into()));
    }

    #[test]
    fn staff_denormalizes_department_fields() {
        let staff_snapshot = TableData::with_rows(
            "staff",
            vec![
                "staff_id".into(),
                "first_name".into(),
                "last_name".into(),
                "department_id".into(),
                "email_address".into(),
                "created_at".into(),
                "last_updated".into(),
            ],
            vec![TableRow::new(vec![
                Cell::I64(1),
                Cell::String("Jeremie".into()),
                Cell::String("Franey".into()),
                Cell::I64(2),
                Cell::String("jeremie.franey@terrifictotes.com".into()),
                Cell::String("2022-11-03 14:20:51.563000".into()),
                Cell::String("2022-11-03 14:20:51.563000".into()),
            ])],
        )
        .unwrap();
        let department_snapshot = TableData::with_rows(
            "department",
            vec![
                "department_id".into(),
                "department_name".into(),
                "location".into(),
                "manager".into(),
                "created_at".into(),
                "last_updated".into(),
            ],
            vec![TableRow::new(vec![
                Cell::I64(2),
                Cell::String("Purchasing".into()),
                Cell::String("Manchester".into()),
                Cell::String("Naomi Lapaglia".into()),
                Cell::String("2022-11-03 14:20:49.962000".into()),
                Cell::String("2022-11-03 14:20:49.962000".into()),
            ])],
        )
        .unwrap();

        let table =
            unwrap_table(staff(&run(), &[staff_snapshot, department_snapshot]).unwrap());

        assert_eq!(
            table.columns(),
            &[
                "staff_id",
                "first_name",
                "last_name",
                "department_name",
                "location",
                "email_address"
            ]
        );
        assert_eq!(table.value(0, 3), &Cell::String("Purchasing".into()));
        assert_eq!(table.value(0, 4), &Cell::String("Manchester".into()));
    }

    #[test]
    fn staff_with_dangling_department_fails_as_malformed() {
        let staff_snapshot = TableData::with_rows(
            "staff",
            vec![
                "staff_id".into(),
                "first_name".into(),
                "last_name".into(),
                "department_id".into(),
                "email_address".into(),
            ],
            vec![TableRow::new(vec![
                Cell::I64(1),
                Cell::String("Jeremie".into()),
                Cell::String("Franey".into()),
                Cell::I64(99),
                Cell::String("jeremie.franey@terrifictotes.com".into()),
            ])],
        )
        .unwrap();
        let department_snapshot = TableData::new(
            "department",
            vec![
                "department_id".into(),
                "department_name".into(),
                "location".into(),
            ],
        );

        let err = staff(&run(), &[staff_snapshot, department_snapshot]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn location_renames_and_leads_with_the_identifier() {
        let address_snapshot = TableData::with_rows(
            "address",
            vec![
                "address_id".into(),
                "address_line_1".into(),
                "address_line_2".into(),
                "district".into(),
                "city".into(),
                "postal_code".into(),
                "country".into(),
                "phone".into(),
                "created_at".into(),
                "last_updated".into(),
            ],
            vec![TableRow::new(vec![
                Cell::I64(1),
                Cell::String("6826 Herzog Via".into()),
                Cell::Null,
                Cell::String("Avon".into()),
                Cell::String("New Patienceburgh".into()),
                Cell::String("28441".into()),
                Cell::String("Turkey".into()),
                Cell::String("1803 637401".into()),
                Cell::String("2022-11-03 14:20:49.962000".into()),
                Cell::String("2022-11-03 14:20:49.962000".into()),
            ])],
        )
        .unwrap();

        let table = unwrap_table(location(&run(), &[address_snapshot]).unwrap());

        assert_eq!(table.name(), "dim_location");
        assert_eq!(table.columns()[0], "location_id");
        assert_eq!(table.value(0, 0), &Cell::I64(1));
    }

    #[test]
    fn sales_order_splits_timestamps_and_numbers_rows() {
        let snapshot = TableData::with_rows(
            "sales_order",
            vec![
                "sales_order_id".into(),
                "created_at".into(),
                "last_updated".into(),
                "design_id".into(),
                "staff_id".into(),
                "counterparty_id".into(),
                "units_sold".into(),
                "unit_price".into(),
                "currency_id".into(),
                "agreed_delivery_date".into(),
                "agreed_payment_date".into(),
                "agreed_delivery_location_id".into(),
            ],
            vec![TableRow::new(vec![
                Cell::I64(2),
                Cell::String("2022-11-03 14:20:52.186000".into()),
                Cell::String("2022-11-03 14:20:52.186000".into()),
                Cell::I64(3),
                Cell::I64(19),
                Cell::I64(8),
                Cell::I64(42972),
                Cell::F64(3.94),
                Cell::I64(2),
                Cell::String("2022-11-07".into()),
                Cell::String("2022-11-08".into()),
                Cell::I64(8),
            ])],
        )
        .unwrap();

        let table = unwrap_table(sales_order(&run(), &[snapshot]).unwrap());

        assert_eq!(table.name(), "fact_sales_order");
        assert_eq!(table.columns().len(), 15);
        assert_eq!(table.columns()[0], "sales_record_id");
        assert_eq!(table.value(0, 0), &Cell::I64(1));
        assert_eq!(
            table.value(0, 2).to_csv_field(),
            "2022-11-03"
        );
        assert_eq!(
            table.value(0, 3).to_csv_field(),
            "14:20:52.186000"
        );
        assert_eq!(table.columns()[6], "sales_staff_id");
    }
}
