use nutriscan_core::ProductRecord;

/// Demo catalog for trying the scanner without a running service
pub fn sample_products() -> Vec<ProductRecord> {
    // barcode, name, kcal, fat, protein, carbs, fiber, sugar, sodium (mg), score, allergens
    let rows: [(&str, &str, f64, f64, f64, f64, f64, f64, f64, u8, &[&str]); 10] = [
        ("1234567890", "Organic Whole Wheat Bread", 250.0, 3.0, 8.0, 45.0, 6.0, 4.0, 380.0, 72, &["gluten", "wheat"]),
        ("9876543210", "Chocolate Chip Cookies", 480.0, 22.0, 5.0, 65.0, 2.0, 32.0, 420.0, 25, &["gluten", "dairy", "eggs"]),
        ("5551234567", "Greek Yogurt", 100.0, 0.5, 17.0, 6.0, 0.0, 4.0, 65.0, 85, &["dairy"]),
        ("7778889999", "Potato Chips", 540.0, 34.0, 7.0, 52.0, 4.0, 2.0, 680.0, 20, &[]),
        ("1112223334", "Almond Milk", 30.0, 2.5, 1.0, 1.0, 1.0, 0.0, 180.0, 78, &["tree nuts"]),
        ("4445556667", "Granola Bar", 190.0, 7.0, 4.0, 29.0, 3.0, 12.0, 140.0, 55, &["gluten", "tree nuts"]),
        ("0123456789", "Canned Soup", 220.0, 11.0, 8.0, 22.0, 4.0, 6.0, 890.0, 45, &["gluten", "dairy"]),
        ("9998887776", "Energy Drink", 110.0, 0.0, 0.0, 28.0, 0.0, 27.0, 200.0, 15, &[]),
        ("6667778889", "Peanut Butter", 588.0, 50.0, 25.0, 20.0, 6.0, 9.0, 476.0, 48, &["peanuts"]),
        ("3334445556", "Orange Juice", 110.0, 0.0, 2.0, 26.0, 0.5, 21.0, 5.0, 62, &[]),
    ];

    rows.into_iter()
        .map(
            |(barcode, name, calories, fats, protein, carbs, fiber, sugar, sodium, score, allergens)| {
                let mut product = ProductRecord::new(barcode, name);
                product.calories = Some(calories);
                product.fats = Some(fats);
                product.protein = Some(protein);
                product.carbs = Some(carbs);
                product.fiber = Some(fiber);
                product.sugar = Some(sugar);
                product.sodium = Some(sodium);
                product.health_score = score;
                product.allergens = allergens.iter().map(|a| a.to_string()).collect();
                product
            },
        )
        .collect()
}
