//! Stress Tests - Push the engine to its limits.
//!
//! These tests verify correctness under extreme conditions:
//! - Near-capacity operation and pool exhaustion
//! - High contention at single price levels
//! - Rapid order churn
//! - Maximum values for prices and quantities

use match_lob::{
    CancelOrder, ClientId, ClientRequest, ClientResponseKind, EngineConfig, EngineError, EventLog,
    MarketUpdateKind, MatchingEngine, NewOrder, OrderId, Price, Qty, Side,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn engine(max_orders: u32, max_price_levels: u32) -> MatchingEngine {
    MatchingEngine::new(EngineConfig {
        instruments: 1,
        max_orders,
        max_price_levels,
        ..Default::default()
    })
    .unwrap()
}

fn place(client_id: ClientId, client_order_id: OrderId, side: Side, price: Price, qty: Qty) -> ClientRequest {
    ClientRequest::New(NewOrder {
        client_id,
        client_order_id,
        ticker_id: 0,
        side,
        price,
        qty,
    })
}

fn cancel(client_id: ClientId, client_order_id: OrderId) -> ClientRequest {
    ClientRequest::Cancel(CancelOrder {
        client_id,
        client_order_id,
        ticker_id: 0,
    })
}

fn count_responses(log: &EventLog, kind: ClientResponseKind) -> usize {
    log.responses.iter().filter(|r| r.kind == kind).count()
}

fn count_updates(log: &EventLog, kind: MarketUpdateKind) -> usize {
    log.updates.iter().filter(|u| u.kind == kind).count()
}

// ============================================================================
// Capacity Stress Tests
// ============================================================================

#[test]
fn test_near_capacity_operation() {
    const CAPACITY: u32 = 10_000;
    let mut engine = engine(CAPACITY, 256);

    // Fill to 95% capacity
    let target_orders = (CAPACITY as f64 * 0.95) as u64;

    for i in 0..target_orders {
        // Non-overlapping prices: bids 8000-8990, asks 10000-10990
        let (side, price) = if i % 2 == 0 {
            (Side::Bid, 8_000 + (i % 100) * 10)
        } else {
            (Side::Ask, 10_000 + (i % 100) * 10)
        };
        let log = engine.process_request(place(1, i, side, price, 100)).unwrap();

        assert_eq!(
            count_updates(&log, MarketUpdateKind::Add),
            1,
            "Order {} should rest, got {:?}",
            i,
            log
        );
    }

    assert_eq!(engine.order_count(), target_orders as usize);
    engine.book(0).unwrap().validate();
}

#[test]
fn test_order_pool_exhaustion_is_fatal() {
    const CAPACITY: u32 = 100;
    let mut engine = engine(CAPACITY, 16);

    for i in 0..CAPACITY as u64 {
        engine.process_request(place(1, i, Side::Bid, 10_000, 100)).unwrap();
    }

    let err = engine
        .process_request(place(1, CAPACITY as u64, Side::Bid, 9_999, 100))
        .unwrap_err();
    assert_eq!(err, EngineError::OrderPoolExhausted { ticker_id: 0, capacity: CAPACITY });

    // No level was left behind for the order that could not rest
    let book = engine.book(0).unwrap();
    assert_eq!(book.level_count(Side::Bid), 1);
    assert_eq!(book.levels_allocated(), 1);
    book.validate();
}

#[test]
fn test_full_pool_still_matches() {
    const CAPACITY: u32 = 10;
    let mut engine = engine(CAPACITY, 16);

    for i in 0..CAPACITY as u64 {
        engine.process_request(place(1, i, Side::Ask, 10_000, 10)).unwrap();
    }

    // A fully marketable order never needs a slot
    let log = engine.process_request(place(2, 1, Side::Bid, 10_000, 25)).unwrap();
    assert_eq!(count_updates(&log, MarketUpdateKind::Trade), 3);
    assert_eq!(engine.order_count(), 8);
}

#[test]
fn test_level_pool_exhaustion_is_fatal() {
    let mut engine = engine(100, 4);

    for i in 0..4u64 {
        engine.process_request(place(1, i, Side::Bid, 100 + i, 1)).unwrap();
    }

    let err = engine.process_request(place(1, 4, Side::Bid, 200, 1)).unwrap_err();
    assert_eq!(err, EngineError::LevelPoolExhausted { ticker_id: 0, capacity: 4 });

    // Existing levels still accept orders
    engine.process_request(place(1, 5, Side::Bid, 100, 1)).unwrap();
    assert_eq!(engine.book(0).unwrap().depth_at(Side::Bid, 100), (2, 2));
}

#[test]
fn test_arena_reuse_after_cancel() {
    const CAPACITY: u32 = 100;
    let mut engine = engine(CAPACITY, 16);

    for round in 0..10u64 {
        for i in 0..CAPACITY as u64 {
            engine.process_request(place(1, round * 1_000 + i, Side::Bid, 10_000, 10)).unwrap();
        }
        for i in 0..CAPACITY as u64 {
            let log = engine.process_request(cancel(1, round * 1_000 + i)).unwrap();
            assert_eq!(count_responses(&log, ClientResponseKind::Canceled), 1);
        }
        assert_eq!(engine.order_count(), 0);
    }
}

// ============================================================================
// High Contention Tests
// ============================================================================

#[test]
fn test_single_price_level_contention() {
    let mut engine = engine(10_000, 16);
    const ORDERS: u64 = 1_000;

    for i in 0..ORDERS {
        engine.process_request(place((i % 100) as ClientId, i, Side::Ask, 10_000, 100)).unwrap();
    }

    assert_eq!(engine.order_count(), ORDERS as usize);
    assert_eq!(engine.book(0).unwrap().depth_at(Side::Ask, 10_000), (ORDERS * 100, ORDERS as u32));

    // Match through all of them
    let log = engine
        .process_request(place(999, 0, Side::Bid, 10_000, (ORDERS * 100) as Qty))
        .unwrap();

    assert_eq!(count_updates(&log, MarketUpdateKind::Trade), ORDERS as usize);
    assert_eq!(count_updates(&log, MarketUpdateKind::Cancel), ORDERS as usize);
    assert_eq!(engine.order_count(), 0, "Book should be empty after matching all");
}

#[test]
fn test_fifo_priority_under_contention() {
    let mut engine = engine(1_000, 16);

    for i in 0..100u64 {
        engine.process_request(place(i as ClientId, i, Side::Ask, 10_000, 10)).unwrap();
    }

    // 50 orders worth
    let log = engine.process_request(place(999, 1_000, Side::Bid, 10_000, 500)).unwrap();

    let makers: Vec<_> = log
        .updates
        .iter()
        .filter(|u| u.kind == MarketUpdateKind::Cancel)
        .map(|u| u.exchange_order_id)
        .collect();

    assert_eq!(makers.len(), 50);
    for (i, &maker) in makers.iter().enumerate() {
        assert_eq!(maker, Some(i as u64 + 1), "Fill {} should hit exchange order {}", i, i + 1);
    }
}

// ============================================================================
// Rapid Churn Tests
// ============================================================================

#[test]
fn test_rapid_add_cancel_cycles() {
    let mut engine = engine(16, 16);
    const CYCLES: u64 = 10_000;

    for cycle in 0..CYCLES {
        let side = if cycle % 2 == 0 { Side::Bid } else { Side::Ask };
        let log = engine.process_request(place(1, cycle, side, 10_000, 100)).unwrap();
        assert_eq!(count_responses(&log, ClientResponseKind::Accepted), 1);

        let log = engine.process_request(cancel(1, cycle)).unwrap();
        assert_eq!(count_responses(&log, ClientResponseKind::Canceled), 1);
    }

    let book = engine.book(0).unwrap();
    assert_eq!(book.order_count(), 0);
    assert_eq!(book.orders_allocated(), 0);
    assert_eq!(book.levels_allocated(), 0);
}

#[test]
fn test_rapid_match_cycles() {
    let mut engine = engine(16, 16);
    const CYCLES: u64 = 5_000;

    let mut total_trades = 0;

    for cycle in 0..CYCLES {
        engine.process_request(place(1, cycle, Side::Ask, 10_000, 100)).unwrap();
        let log = engine.process_request(place(2, cycle, Side::Bid, 10_000, 100)).unwrap();
        total_trades += count_updates(&log, MarketUpdateKind::Trade);
    }

    assert_eq!(total_trades, CYCLES as usize);
    assert_eq!(engine.order_count(), 0, "Book should be empty");
}

// ============================================================================
// Edge Case Tests
// ============================================================================

#[test]
fn test_zero_price() {
    let mut engine = engine(16, 16);

    engine.process_request(place(1, 1, Side::Bid, 0, 10)).unwrap();
    assert_eq!(engine.best_bid(0), Some(0));

    let log = engine.process_request(place(2, 1, Side::Ask, 0, 10)).unwrap();
    assert_eq!(count_updates(&log, MarketUpdateKind::Trade), 1);
    assert_eq!(engine.best_bid(0), None);
}

#[test]
fn test_max_price() {
    let mut engine = engine(16, 16);

    engine.process_request(place(1, 1, Side::Ask, Price::MAX, 10)).unwrap();
    engine.process_request(place(1, 2, Side::Ask, Price::MAX - 1, 10)).unwrap();

    assert_eq!(engine.best_ask(0), Some(Price::MAX - 1));
    engine.book(0).unwrap().validate();
}

#[test]
fn test_max_quantity() {
    let mut engine = engine(16, 16);

    engine.process_request(place(1, 1, Side::Bid, 100, Qty::MAX)).unwrap();
    engine.process_request(place(1, 2, Side::Bid, 100, Qty::MAX)).unwrap();

    // Level totals do not overflow the order quantity type
    assert_eq!(engine.book(0).unwrap().depth_at(Side::Bid, 100), (2 * Qty::MAX as u64, 2));

    let log = engine.process_request(place(2, 1, Side::Ask, 100, Qty::MAX)).unwrap();
    assert_eq!(log.updates[0].qty, Qty::MAX);
    assert_eq!(engine.order_count(), 1);
}

#[test]
fn test_quantity_one() {
    let mut engine = engine(16, 16);

    engine.process_request(place(1, 1, Side::Ask, 100, 1)).unwrap();
    let log = engine.process_request(place(2, 1, Side::Bid, 100, 1)).unwrap();

    assert_eq!(count_updates(&log, MarketUpdateKind::Trade), 1);
    assert!(engine.book(0).unwrap().is_empty());
}

#[test]
fn test_many_price_levels() {
    const LEVELS: u64 = 1_000;
    let mut engine = engine(2 * LEVELS as u32, LEVELS as u32);

    // Interleaved insertion order exercises the sorted splice
    for i in 0..LEVELS {
        let price = if i % 2 == 0 { 10_000 + i } else { 10_000 + LEVELS * 2 - i };
        engine.process_request(place(1, i, Side::Ask, price, 1)).unwrap();
    }

    let book = engine.book(0).unwrap();
    assert_eq!(book.level_count(Side::Ask), LEVELS as usize);
    assert_eq!(book.best_ask(), Some(10_000));
    book.validate();

    // Sweep everything
    let log = engine.process_request(place(2, 1, Side::Bid, Price::MAX, LEVELS as Qty)).unwrap();
    let prices: Vec<_> = log
        .updates
        .iter()
        .filter(|u| u.kind == MarketUpdateKind::Trade)
        .map(|u| u.price)
        .collect();
    assert!(prices.windows(2).all(|w| w[0] < w[1]), "Sweep should walk up the ask ladder");
    assert!(engine.book(0).unwrap().is_empty());
}

#[test]
fn test_cancel_during_partial_fill() {
    let mut engine = engine(16, 16);

    engine.process_request(place(1, 1, Side::Ask, 100, 100)).unwrap();
    engine.process_request(place(2, 1, Side::Bid, 100, 30)).unwrap();

    let log = engine.process_request(cancel(1, 1)).unwrap();
    assert_eq!(log.responses[0].kind, ClientResponseKind::Canceled);
    assert_eq!(log.responses[0].leaves_qty, Some(70));

    // The next bid rests instead of trading
    let log = engine.process_request(place(2, 2, Side::Bid, 100, 10)).unwrap();
    assert_eq!(count_updates(&log, MarketUpdateKind::Trade), 0);
    assert_eq!(engine.best_bid(0), Some(100));
}

#[test]
fn test_partial_match_across_levels() {
    let mut engine = engine(16, 16);

    engine.process_request(place(1, 1, Side::Ask, 100, 10)).unwrap();
    engine.process_request(place(1, 2, Side::Ask, 101, 10)).unwrap();
    engine.process_request(place(1, 3, Side::Ask, 102, 10)).unwrap();

    let log = engine.process_request(place(2, 1, Side::Bid, 101, 25)).unwrap();

    // 10 @ 100, 10 @ 101, 5 rests at 101
    assert_eq!(count_updates(&log, MarketUpdateKind::Trade), 2);
    assert_eq!(engine.best_bid(0), Some(101));
    assert_eq!(engine.best_ask(0), Some(102));
    assert_eq!(engine.book(0).unwrap().depth_at(Side::Bid, 101), (5, 1));
}

// ============================================================================
// Large Scale Fuzzing
// ============================================================================

#[test]
fn test_large_random_workload() {
    const SEED: u64 = 0xABCDEF123456;
    const OPS: usize = 50_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = engine(100_000, 4_096);

    let mut next_order_id = 1u64;
    let mut placed: Vec<(ClientId, OrderId)> = Vec::new();
    let mut total_trades = 0usize;
    let mut total_cancels = 0usize;

    for op in 0..OPS {
        if placed.is_empty() || rng.gen_bool(0.65) {
            let client_id = rng.gen_range(1..100);
            let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
            let log = engine
                .process_request(place(client_id, next_order_id, side, rng.gen_range(9_000..11_000), rng.gen_range(1..500)))
                .unwrap();

            total_trades += count_updates(&log, MarketUpdateKind::Trade);
            placed.push((client_id, next_order_id));
            next_order_id += 1;
        } else {
            let idx = rng.gen_range(0..placed.len());
            let (client_id, order_id) = placed.swap_remove(idx);

            let log = engine.process_request(cancel(client_id, order_id)).unwrap();
            total_cancels += count_responses(&log, ClientResponseKind::Canceled);
        }

        if op % 5_000 == 0 {
            engine.book(0).unwrap().validate();
        }
    }

    let book = engine.book(0).unwrap();
    book.validate();
    if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
        assert!(bid < ask, "Book crossed: {} >= {}", bid, ask);
    }

    println!("Large workload test completed:");
    println!("  Operations: {}", OPS);
    println!("  Orders placed: {}", next_order_id - 1);
    println!("  Total trades: {}", total_trades);
    println!("  Total cancels: {}", total_cancels);
    println!("  Final book size: {}", engine.order_count());
}

// ============================================================================
// Memory Leak Detection
// ============================================================================

#[test]
fn test_arena_returns_all_slots() {
    const CAPACITY: u32 = 1_000;
    let mut engine = engine(CAPACITY, 1_000);

    // Non-overlapping prices: bids 5000-5499, asks 15000-15499
    for i in 0..CAPACITY as u64 {
        let (side, price) = if i % 2 == 0 {
            (Side::Bid, 5_000 + (i / 2) % 500)
        } else {
            (Side::Ask, 15_000 + (i / 2) % 500)
        };
        engine.process_request(place(1, i, side, price, 100)).unwrap();
    }

    assert_eq!(engine.order_count(), CAPACITY as usize);

    for i in 0..CAPACITY as u64 {
        engine.process_request(cancel(1, i)).unwrap();
    }

    let book = engine.book(0).unwrap();
    assert_eq!(book.orders_allocated(), 0);
    assert_eq!(book.levels_allocated(), 0);

    // Should be able to fill again (arena slots reused)
    for i in 0..CAPACITY as u64 {
        let log = engine.process_request(place(1, i + CAPACITY as u64, Side::Bid, 10_000, 100)).unwrap();
        assert_eq!(
            count_updates(&log, MarketUpdateKind::Add),
            1,
            "Order {} should rest after arena reset",
            i
        );
    }
}
