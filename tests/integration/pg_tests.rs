//! Postgres store integration tests
//!
//! Need a reachable database in `DATABASE_URL`.
//! Run with: cargo test --test pg_tests -- --ignored

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use bookshelf_server::{
    clock::SystemClock,
    error::AppError,
    models::{Actor, Book, BookInput, Loan, Role},
    repository::{PgStore, Store},
    services::{inventory::InventoryService, lending::LendingService},
};

struct Fixture {
    pool: PgPool,
    store: Arc<PgStore>,
    inventory: InventoryService,
    lending: LendingService,
}

async fn fixture() -> Fixture {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let store = Arc::new(PgStore::new(pool.clone()));
    let clock = Arc::new(SystemClock);
    Fixture {
        inventory: InventoryService::new(store.clone(), clock.clone()),
        lending: LendingService::new(store.clone(), clock, Duration::days(14)),
        store,
        pool,
    }
}

fn employee(id: &str) -> Actor {
    Actor {
        user_id: format!("{}-{}", id, Uuid::new_v4()),
        name: id.to_string(),
        email: format!("{}@example.com", id),
        role: Role::Employee,
    }
}

fn input(total_copies: i32) -> BookInput {
    BookInput {
        title: "Database Internals".to_string(),
        author: "Alex Petrov".to_string(),
        isbn: None,
        cover: None,
        description: None,
        category: Some("Databases".to_string()),
        total_copies,
    }
}

impl Fixture {
    async fn available(&self, id: Uuid) -> i32 {
        self.store
            .get_book(id)
            .await
            .unwrap()
            .expect("Book should exist")
            .available_copies
    }

    async fn active(&self, id: Uuid) -> i64 {
        let mut uow = self.store.begin().await.unwrap();
        uow.count_active(id).await.unwrap()
    }
}

#[tokio::test]
#[ignore]
async fn test_borrow_rules() {
    let f = fixture().await;
    let book = f.inventory.create_book(input(1)).await.unwrap();
    let a = employee("a");

    f.lending.borrow(book.id, &a).await.unwrap();
    assert_eq!(f.available(book.id).await, 0);

    let again = f.lending.borrow(book.id, &a).await;
    assert!(matches!(again, Err(AppError::OutOfStock)));

    let other = f.lending.borrow(book.id, &employee("b")).await;
    assert!(matches!(other, Err(AppError::OutOfStock)));
    assert_eq!(f.available(book.id).await, 0);
    assert_eq!(f.active(book.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_already_borrowed() {
    let f = fixture().await;
    let book = f.inventory.create_book(input(2)).await.unwrap();
    let a = employee("a");

    f.lending.borrow(book.id, &a).await.unwrap();
    let again = f.lending.borrow(book.id, &a).await;
    assert!(matches!(again, Err(AppError::AlreadyBorrowed)));
    assert_eq!(f.available(book.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_active_loan_index_maps_to_already_borrowed() {
    let f = fixture().await;
    let book = f.inventory.create_book(input(3)).await.unwrap();
    let a = employee("a");
    let now = Utc::now();

    let mut uow = f.store.begin().await.unwrap();
    uow.create_loan(&Loan::open(book.id, &a, now, Duration::days(14)))
        .await
        .unwrap();
    let duplicate = uow
        .create_loan(&Loan::open(book.id, &a, now, Duration::days(14)))
        .await;
    assert!(matches!(duplicate, Err(AppError::AlreadyBorrowed)));
}

#[tokio::test]
#[ignore]
async fn test_counter_check_maps_to_out_of_stock() {
    let f = fixture().await;
    let mut book = f.inventory.create_book(input(1)).await.unwrap();

    let mut uow = f.store.begin().await.unwrap();
    book.available_copies = -1;
    let result = uow.update_book(&book).await;
    assert!(matches!(result, Err(AppError::OutOfStock)));
}

#[tokio::test]
#[ignore]
async fn test_conditional_decrement_stops_at_zero() {
    let f = fixture().await;
    let book = f.inventory.create_book(input(1)).await.unwrap();

    let mut uow = f.store.begin().await.unwrap();
    let taken = uow.decrement_available(book.id).await.unwrap();
    assert_eq!(taken.available_copies, 0);
    assert!(matches!(
        uow.decrement_available(book.id).await,
        Err(AppError::OutOfStock)
    ));
    assert!(matches!(
        uow.decrement_available(Uuid::new_v4()).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_return_is_write_once() {
    let f = fixture().await;
    let book = f.inventory.create_book(input(2)).await.unwrap();
    let a = employee("a");
    let loan = f.lending.borrow(book.id, &a).await.unwrap();

    let returned = f.lending.return_loan(loan.id, &a).await.unwrap();
    assert!(returned.returned_at.is_some());

    let again = f.lending.return_loan(loan.id, &a).await;
    assert!(matches!(again, Err(AppError::AlreadyReturned)));
    assert_eq!(f.available(book.id).await, 2);

    let mut uow = f.store.begin().await.unwrap();
    assert!(matches!(
        uow.mark_returned(loan.id, Utc::now()).await,
        Err(AppError::AlreadyReturned)
    ));
}

#[tokio::test]
#[ignore]
async fn test_delete_guard_and_cascade() {
    let f = fixture().await;
    let book = f.inventory.create_book(input(1)).await.unwrap();
    let a = employee("a");
    let loan = f.lending.borrow(book.id, &a).await.unwrap();

    let result = f.inventory.delete_book(book.id).await;
    assert!(matches!(result, Err(AppError::HasActiveLoans)));

    f.lending.return_loan(loan.id, &a).await.unwrap();
    f.inventory.delete_book(book.id).await.unwrap();

    assert!(f.store.get_book(book.id).await.unwrap().is_none());
    assert!(f.store.get_loan(loan.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_clamp_then_capped_increment() {
    let f = fixture().await;
    let book = f.inventory.create_book(input(3)).await.unwrap();
    let (a, b) = (employee("a"), employee("b"));
    let loan_a = f.lending.borrow(book.id, &a).await.unwrap();
    let loan_b = f.lending.borrow(book.id, &b).await.unwrap();

    let shrunk = f.inventory.update_book(book.id, input(1)).await.unwrap();
    assert_eq!(shrunk.available_copies, 0);

    f.lending.return_loan(loan_a.id, &a).await.unwrap();
    assert_eq!(f.available(book.id).await, 0);

    f.lending.return_loan(loan_b.id, &b).await.unwrap();
    assert_eq!(f.available(book.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_regrow_after_clamp() {
    let f = fixture().await;
    let book = f.inventory.create_book(input(3)).await.unwrap();
    f.lending.borrow(book.id, &employee("a")).await.unwrap();
    f.lending.borrow(book.id, &employee("b")).await.unwrap();

    f.inventory.update_book(book.id, input(1)).await.unwrap();
    let regrown = f.inventory.update_book(book.id, input(3)).await.unwrap();
    assert_eq!(regrown.available_copies, 1);

    f.lending.borrow(book.id, &employee("c")).await.unwrap();
    let result = f.lending.borrow(book.id, &employee("d")).await;
    assert!(matches!(result, Err(AppError::OutOfStock)));
    assert_eq!(f.active(book.id).await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_race_for_last_copy() {
    let f = fixture().await;
    let book: Book = f.inventory.create_book(input(1)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let lending = f.lending.clone();
        handles.push(tokio::spawn(async move {
            lending.borrow(book.id, &employee(&format!("user-{}", i))).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::OutOfStock) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(f.available(book.id).await, 0);
    assert_eq!(f.active(book.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_serialization_failure_maps_to_contention() {
    let f = fixture().await;
    let book = f.inventory.create_book(input(1)).await.unwrap();

    let mut first = f.pool.begin().await.unwrap();
    let mut second = f.pool.begin().await.unwrap();
    for tx in [&mut first, &mut second] {
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut **tx)
            .await
            .unwrap();
        sqlx::query("SELECT title FROM books WHERE id = $1")
            .bind(book.id)
            .execute(&mut **tx)
            .await
            .unwrap();
    }

    sqlx::query("UPDATE books SET title = 'first' WHERE id = $1")
        .bind(book.id)
        .execute(&mut *first)
        .await
        .unwrap();
    first.commit().await.unwrap();

    let err = sqlx::query("UPDATE books SET title = 'second' WHERE id = $1")
        .bind(book.id)
        .execute(&mut *second)
        .await
        .expect_err("concurrent update should fail");
    assert!(matches!(AppError::from(err), AppError::Contention));
}
