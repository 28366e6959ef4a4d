//! Example watching vehicles around a depot with a live radius query.
//!
//! Run with: cargo run --example live_query

use geoquery::{Document, GeoIndex, GeoPoint, GeoQueryEventListener, ThreadDispatcher};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Printer;

impl GeoQueryEventListener for Printer {
    fn on_entered(&self, key: &str, point: &GeoPoint, _document: &Document) {
        println!("   {} entered at {}", key, point);
    }

    fn on_exited(&self, key: &str, _document: &Document) {
        println!("   {} left the area", key);
    }

    fn on_moved(&self, key: &str, point: &GeoPoint, _document: &Document) {
        println!("   {} moved to {}", key, point);
    }

    fn on_ready(&self) {
        println!("   initial data loaded");
    }

    fn on_error(&self, error: &geoquery::GeoQueryError) {
        println!("   error: {}", error);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Live Query Example ===\n");

    let index = GeoIndex::builder()
        .dispatcher(ThreadDispatcher::new()?)
        .build()?;

    let depot = GeoPoint::new(52.5200, 13.4050);
    index.set_location("van-1", &GeoPoint::new(52.5210, 13.4060))?;
    index.set_location("van-2", &GeoPoint::new(52.6000, 13.5000))?;

    println!("1. Query 2 km around the depot");
    let query = index.query_at_location(depot, 2_000.0)?;
    println!("   ranges: {}", query.ranges().len());
    query.add_listener(Arc::new(Printer))?;
    println!("   ranges after start: {}", query.ranges().len());

    println!("\n2. Vehicles moving");
    index.set_location("van-1", &GeoPoint::new(52.5190, 13.4040))?;
    index.set_location("van-2", &GeoPoint::new(52.5205, 13.4055))?;
    index.set_location("van-1", &GeoPoint::new(52.7000, 13.7000))?;
    thread::sleep(Duration::from_millis(100));

    println!("\n3. Widening the query to 20 km");
    query.set_radius(20_000.0)?;
    thread::sleep(Duration::from_millis(100));
    println!("   members: {}", query.member_count());

    query.remove_all_listeners();
    println!("\nDone");
    Ok(())
}
