//! PostgreSQL store tests
//!
//! These need a reachable database in `DATABASE_URL`; migrations are applied on connect.
//! Run with: DATABASE_URL=postgres://... cargo test --test pg_tests -- --ignored

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use biblioteca_server::{
    config::LoansConfig,
    error::AppError,
    models::{
        book::{Book, BookFields},
        loan::Loan,
        user::{Principal, Role},
    },
    repository::{PgStore, Store},
    services::Services,
};

async fn connect() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    PgStore::new(pool)
}

async fn services() -> (PgStore, Arc<Services>) {
    let store = connect().await;
    let services = Services::new(Arc::new(store.clone()), LoansConfig::default());
    (store, Arc::new(services))
}

fn admin() -> Principal {
    Principal::new(Uuid::new_v4(), Role::Admin)
}

fn member() -> Principal {
    Principal::new(Uuid::new_v4(), Role::Member)
}

async fn add_book(services: &Services, copies: i32) -> Book {
    services
        .coordinator
        .create_book(
            &admin(),
            BookFields {
                title: format!("Vestido de Noiva {}", Uuid::new_v4()),
                author: "Nelson Rodrigues".to_string(),
                description: "Teatro".to_string(),
                cover_image_url: None,
                total_copies: copies,
            },
            Utc::now(),
        )
        .await
        .expect("create book")
}

fn raw_book(total: i32, available: i32) -> Book {
    let now = Utc::now();
    Book {
        id: Uuid::new_v4(),
        title: format!("Dois Irmãos {}", Uuid::new_v4()),
        author: "Milton Hatoum".to_string(),
        description: "Romance".to_string(),
        cover_image_url: None,
        total_copies: total,
        available_copies: available,
        created_at: now,
        updated_at: now,
    }
}

/// The book's counters agree with its unreturned loans
async fn assert_ledger_consistent(store: &PgStore, book_id: Uuid) {
    let entry = store
        .ledger_snapshot()
        .await
        .unwrap()
        .into_iter()
        .find(|e| e.book.id == book_id)
        .expect("book in snapshot");
    assert!(entry.book.available_copies >= 0);
    assert_eq!(i64::from(entry.book.borrowed_count()), entry.active_loans);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run with: cargo test -- --ignored
async fn test_concurrent_borrows_of_last_copy() {
    let (store, services) = services().await;
    let book = add_book(&services, 1).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let services = services.clone();
        let book_id = book.id;
        handles.push(tokio::spawn(async move {
            services.coordinator.borrow(&member(), book_id, Utc::now()).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::NoCopiesAvailable { .. }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(store.get_book(book.id).await.unwrap().unwrap().available_copies, 0);
    assert_ledger_consistent(&store, book.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_returns_of_same_loan() {
    let (store, services) = services().await;
    let book = add_book(&services, 2).await;
    let owner = member();
    let loan = services.coordinator.borrow(&owner, book.id, Utc::now()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let services = services.clone();
        handles.push(tokio::spawn(async move {
            services.coordinator.return_loan(&owner, loan.id, Utc::now()).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::AlreadyReturned { .. }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(store.get_book(book.id).await.unwrap().unwrap().available_copies, 2);
    assert_ledger_consistent(&store, book.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_borrows_by_one_user_respect_limit() {
    let (store, services) = services().await;
    let reader = member();
    let mut book_ids = Vec::new();
    for _ in 0..6 {
        book_ids.push(add_book(&services, 1).await.id);
    }

    let mut handles = Vec::new();
    for book_id in book_ids.iter().copied() {
        let services = services.clone();
        handles.push(tokio::spawn(async move {
            services.coordinator.borrow(&reader, book_id, Utc::now()).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::LoanLimitExceeded { .. }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(store.count_active_loans_by_user(reader.user_id).await.unwrap(), 3);
    for book_id in book_ids {
        assert_ledger_consistent(&store, book_id).await;
    }
}

#[tokio::test]
#[ignore]
async fn test_unique_index_rejects_second_active_loan_for_pair() {
    let store = connect().await;
    let book = raw_book(3, 3);
    let now = Utc::now();
    let first = Loan {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        book_id: book.id,
        loan_date: now,
        return_deadline: now + Duration::days(7),
        returned: false,
    };
    let second = Loan {
        id: Uuid::new_v4(),
        ..first.clone()
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_book(&book).await.unwrap();
    tx.insert_loan(&first).await.unwrap();
    let duplicate = tx.insert_loan(&second).await;
    assert!(matches!(duplicate, Err(AppError::DuplicateLoan { book_id }) if book_id == book.id));
}

#[tokio::test]
#[ignore]
async fn test_mark_returned_is_compare_and_set() {
    let store = connect().await;
    let book = raw_book(1, 0);
    let now = Utc::now();
    let loan = Loan {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        book_id: book.id,
        loan_date: now,
        return_deadline: now + Duration::days(7),
        returned: false,
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_book(&book).await.unwrap();
    tx.insert_loan(&loan).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.mark_returned(loan.id).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(matches!(
        tx.mark_returned(loan.id).await,
        Err(AppError::AlreadyReturned { .. })
    ));
}

#[tokio::test]
#[ignore]
async fn test_check_constraints_reject_out_of_range_counters() {
    let store = connect().await;

    for book in [raw_book(2, 3), raw_book(2, -1), raw_book(0, 0)] {
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_book(&book).await,
            Err(AppError::Database(_))
        ));
    }
}

#[tokio::test]
#[ignore]
async fn test_dropped_transaction_rolls_back() {
    let store = connect().await;
    let book = raw_book(1, 1);

    {
        let mut tx = store.begin().await.unwrap();
        tx.insert_book(&book).await.unwrap();
    }

    assert!(store.get_book(book.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_delete_keeps_returned_loans() {
    let (store, services) = services().await;
    let book = add_book(&services, 1).await;
    let reader = member();
    let loan = services.coordinator.borrow(&reader, book.id, Utc::now()).await.unwrap();
    services.coordinator.return_loan(&reader, loan.id, Utc::now()).await.unwrap();

    services.coordinator.delete_book(&admin(), book.id).await.unwrap();

    assert!(store.get_book(book.id).await.unwrap().is_none());
    let history = store.get_loan(loan.id).await.unwrap().expect("loan kept");
    assert!(history.returned);
}
