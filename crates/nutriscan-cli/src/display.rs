// Plain-text rendering for the terminal
use chrono::{DateTime, Local, Utc};
use nutriscan_core::{ProductRecord, ScanEvent, ScanResult, ScanStats};
use std::collections::BTreeSet;
use std::path::Path;

pub fn print_scan_result(result: &ScanResult) {
    let product = &result.product;

    println!();
    println!("{} ({})", product.name, result.source);
    println!("  Barcode:  {}", product.barcode);
    if let Some(brand) = &product.brand {
        println!("  Brand:    {}", brand);
    }
    if let Some(category) = &product.category {
        println!("  Category: {}", category);
    }
    println!(
        "  Health:   {}/100 {} {}  ({})",
        product.health_score,
        result.health_label.emoji(),
        result.health_label,
        if product.is_healthy() { "healthy choice" } else { "eat in moderation" }
    );

    let facts = product.nutrition_facts();
    if !facts.is_empty() {
        println!("  Per 100g:");
        for fact in facts {
            println!("    {:<15} {:>7.1} {}", fact.label, fact.value, fact.unit);
        }
    }

    if !product.allergens.is_empty() {
        println!("  Allergens: {}", join(&product.allergens));
    }
    if result.has_conflict() {
        println!("  ⚠ Contains your allergens: {}", join(&result.conflicts));
    }
}

pub fn print_stats(stats: &ScanStats) {
    println!("Total scans:        {}", stats.total);
    println!(
        "Healthy:            {} ({:.1}%)",
        stats.healthy,
        stats.healthy_percentage()
    );
    println!(
        "Allergen conflicts: {} ({:.1}%)",
        stats.allergen_conflicts,
        stats.allergen_percentage()
    );
}

pub fn print_history(scans: &[ScanEvent]) {
    if scans.is_empty() {
        println!("No scans yet");
        return;
    }

    println!("{:>5}  {:<19}  {:<14}  {:<30}  {:^7}  {:^8}", "#", "When", "Barcode", "Product", "Healthy", "Allergen");
    for scan in scans {
        let when: DateTime<Local> = scan.scanned_at.with_timezone(&Local);
        println!(
            "{:>5}  {:<19}  {:<14}  {:<30}  {:^7}  {:^8}",
            scan.id,
            when.format("%Y-%m-%d %H:%M:%S"),
            scan.barcode,
            truncate(scan.product_name.as_deref().unwrap_or("(unknown)"), 30),
            if scan.is_healthy { "✓" } else { "✗" },
            if scan.has_allergen_conflict { "⚠" } else { "" }
        );
    }
}

pub fn print_products(products: &[ProductRecord]) {
    if products.is_empty() {
        println!("Cache is empty. Try `nutriscan sync` or `nutriscan seed`.");
        return;
    }

    for product in products {
        let label = product.health_label();
        println!(
            "{:<14}  {:<30}  {:>3} {}  {}",
            product.barcode,
            truncate(&product.name, 30),
            product.health_score,
            label.emoji(),
            join(&product.allergens)
        );
    }
    println!("{} product(s)", products.len());
}

pub fn print_allergens(allergens: &BTreeSet<String>) {
    if allergens.is_empty() {
        println!("No allergens set");
    } else {
        println!("Your allergens: {}", join(allergens));
    }
}

pub fn print_status(
    base_url: &str,
    db_path: &Path,
    online: bool,
    last_checked: Option<DateTime<Utc>>,
    products: u64,
    scans: u64,
) {
    println!("Service:  {} ({})", base_url, if online { "online" } else { "offline" });
    if let Some(checked) = last_checked {
        println!(
            "Checked:  {}",
            checked.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!("Cache:    {}", db_path.display());
    println!("Products: {}", products);
    println!("Scans:    {}", scans);
}

fn join(tags: &BTreeSet<String>) -> String {
    tags.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
