// src/main.rs

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleSummary {
    id: String,
    iso_week: u32,
    year: i32,
    total_hours: f64,
    total_overtime_hours: f64,
    status: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url =
        std::env::var("SHIFTBOOK_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let client = Client::new();

    // Test 1: Health check
    println!("\n🔍 Testing health check endpoint...");
    let health_response = client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .json::<HealthResponse>()
        .await?;
    println!("Health check response: {:?}", health_response);

    let token = match std::env::var("SHIFTBOOK_TOKEN") {
        Ok(token) => token,
        Err(_) => {
            println!("\n⚠️ SHIFTBOOK_TOKEN is not set.");
            println!("Create one with: shiftbook issue-token --user-id demo --email demo@example.com");
            prompt_for_token()?
        }
    };
    if token.is_empty() {
        println!("\nNo token, skipping schedule tests.");
        return Ok(());
    }

    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token))?,
    );
    let api = format!("{}/api/schedules", base_url);

    // Test 2: Create a week
    println!("\n🔍 Creating schedule for week 11 of 2025...");
    let week = json!({
        "isoWeek": 11,
        "year": 2025,
        "days": [
            { "date": "2025-03-10", "startTime": "09:00", "endTime": "17:00" },
            { "date": "2025-03-11", "startTime": "09:00", "endTime": "18:30", "overtimeHours": 1.5 },
            { "date": "2025-03-12", "startTime": "22:00", "endTime": "06:00" },
            { "date": "2025-03-13", "isRestDay": true }
        ]
    });
    let response = client
        .post(&api)
        .headers(headers.clone())
        .json(&week)
        .send()
        .await?;
    println!("Create response status: {}", response.status());
    if response.status() != StatusCode::CREATED {
        println!("Failed to create schedule: {}", response.text().await?);
        return Ok(());
    }
    let created = response.json::<ScheduleSummary>().await?;
    println!("Created schedule: {:?}", created);
    let schedule_url = format!("{}/{}", api, created.id);

    // Test 3: List
    println!("\n🔍 Listing schedules...");
    let list = client
        .get(&api)
        .headers(headers.clone())
        .send()
        .await?
        .json::<Vec<ScheduleSummary>>()
        .await?;
    for schedule in &list {
        println!(
            "  week {} of {}: {} hours, {} overtime ({})",
            schedule.iso_week,
            schedule.year,
            schedule.total_hours,
            schedule.total_overtime_hours,
            schedule.status
        );
    }

    // Test 4: Update days
    println!("\n🔍 Updating schedule days...");
    let response = client
        .put(&schedule_url)
        .headers(headers.clone())
        .json(&json!({ "days": [{ "startTime": "09:00", "endTime": "16:20" }] }))
        .send()
        .await?;
    print_response("Update", response).await?;

    // Test 5: Recalculate
    println!("\n🔍 Recalculating totals...");
    let response = client
        .post(format!("{}/recalculate", schedule_url))
        .headers(headers.clone())
        .send()
        .await?;
    print_response("Recalculate", response).await?;

    // Test 6: Duplicate week must be rejected
    println!("\n🔍 Creating the same week again (expecting 400)...");
    let response = client
        .post(&api)
        .headers(headers.clone())
        .json(&week)
        .send()
        .await?;
    print_response("Duplicate", response).await?;

    // Test 7: Delete
    println!("\n🔍 Deleting schedule...");
    let response = client
        .delete(&schedule_url)
        .headers(headers)
        .send()
        .await?;
    print_response("Delete", response).await?;

    println!("\n✅ Testing complete!");

    Ok(())
}

async fn print_response(label: &str, response: reqwest::Response) -> Result<(), Box<dyn Error>> {
    println!("{} response status: {}", label, response.status());
    let body: Value = response.json().await?;
    println!("{} response body: {}", label, serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn prompt_for_token() -> Result<String, Box<dyn Error>> {
    println!("Enter JWT token (press Enter to skip token-based tests):");
    let mut token = String::new();
    std::io::stdin().read_line(&mut token)?;
    Ok(token.trim().to_string())
}
