use chrono::NaiveDate;
use rice_stock_ledger::*;

fn movement(date: &str, movement_type: &str, bags: f64, qtls: f64) -> RawMovementRecord {
    RawMovementRecord {
        date: Some(date.to_string()),
        movement_type: Some(movement_type.to_string()),
        variety: Some("Sona Masoori".to_string()),
        bags: Some(bags.into()),
        quantity_quintals: Some(qtls.into()),
        ..Default::default()
    }
}

fn main() {
    println!("📦 Paddy Stock Report Demo\n");

    let mut arrival = movement("2024-04-01", "purchase", 400.0, 300.0);
    arrival.to_location = Some("Godown 1".to_string());
    arrival.broker = Some("Sri Lakshmi Traders".to_string());
    arrival.wb_no = Some("WB-1021".to_string());

    let mut shifting = movement("2024-04-01", "shifting", 150.0, 112.5);
    shifting.from_location = Some("godown 1".to_string());
    shifting.to_location = Some("Godown 2".to_string());

    let mut to_mill = movement("2024-04-01", "production-shifting", 120.0, 90.0);
    to_mill.from_location = Some("Godown 1".to_string());
    to_mill.outturn_ref = Some("OT-24-07".to_string());

    let mut rice = movement("2024-04-02", "production", 110.0, 55.0);
    rice.product_type = Some("Rice".to_string());
    rice.outturn_ref = Some("OT-24-07".to_string());

    let mut bran = movement("2024-04-02", "production", 20.0, 6.3);
    bran.product_type = Some("Bran".to_string());
    bran.outturn_ref = Some("OT-24-07".to_string());

    let records = vec![arrival, shifting, to_mill, rice, bran];

    let generator = match StockReportGenerator::new(EngineConfig::default()) {
        Ok(g) => g.with_observer(&NoopObserver),
        Err(e) => {
            eprintln!("❌ {}", e);
            return;
        }
    };

    let options = ReportOptions {
        date_range: Some("01-04-2024 to 02-04-2024".to_string()),
        filter_type: FilterType::Day,
        generated_at: NaiveDate::from_ymd_opt(2024, 4, 2).and_then(|d| d.and_hms_opt(19, 30, 0)),
        ..ReportOptions::new("Paddy Stock Reconciliation")
    };

    for kind in [ReportKind::PaddyStock, ReportKind::OutturnYield] {
        match generator.generate(kind, &records, &options) {
            Ok(document) => {
                println!("✓ {}: {} page(s)", kind, document.page_count());
                println!("{}", layout::encode_plain_text(&document));
            }
            Err(e) => eprintln!("❌ {}: {}", kind, e),
        }
    }

    let host = FileSystemHost::new(std::env::temp_dir().join("rice-stock-ledger-demo"));
    match futures::executor::block_on(generator.export(ReportKind::PaddyStock, &records, &options, &host)) {
        Ok(receipt) => println!(
            "💾 Saved {} via {} into {}",
            receipt.filename,
            receipt.tier.name(),
            host.output_dir.display()
        ),
        Err(e) => eprintln!("❌ {}", e),
    }
}
