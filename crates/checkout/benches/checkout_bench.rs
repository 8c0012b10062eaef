use std::sync::Arc;

use checkout::{
    CartService, CatalogService, OrderService, PaymentService, ScriptedGateway,
    TransactionProcessor,
};
use common::{BookId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Genre, Money, NewBook, PaymentMethod, Principal, TaxRate, TransactionStatus};
use store::InMemoryStore;

struct Bench {
    carts: CartService<InMemoryStore>,
    orders: OrderService<InMemoryStore>,
    payments: PaymentService<InMemoryStore>,
    books: Vec<BookId>,
}

fn setup(rt: &tokio::runtime::Runtime, book_count: usize) -> Bench {
    let store = InMemoryStore::new();
    let admin = Principal::admin(UserId::new());
    let catalog = CatalogService::new(store.clone());
    let processor = TransactionProcessor::new(Arc::new(ScriptedGateway::always(
        TransactionStatus::Success,
    )));

    let books = rt.block_on(async {
        catalog
            .set_shipping_cost(&admin, "India", Money::from_units(20))
            .await
            .unwrap();
        let mut books = Vec::with_capacity(book_count);
        for i in 0..book_count {
            let book = NewBook {
                title: format!("Bench Book {i:03}"),
                author: "Bench".to_string(),
                genre: Genre::Business,
                year: "2024".to_string(),
                description: String::new(),
                image: String::new(),
                price: Money::from_cents(1000 + i as i64),
                quantity: u32::MAX / 2,
            };
            books.push(catalog.add_book(&admin, book).await.unwrap().id);
        }
        books
    });

    Bench {
        carts: CartService::new(store.clone()),
        orders: OrderService::new(store.clone(), TaxRate::DEFAULT),
        payments: PaymentService::new(store, processor),
        books,
    }
}

fn bench_add_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bench = setup(&rt, 1);
    let user = Principal::customer(UserId::new());

    c.bench_function("checkout/add_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                bench.carts.add_item(&user, bench.books[0], 1).await.unwrap();
            });
        });
    });
}

fn bench_order_and_pay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bench = setup(&rt, 5);

    c.bench_function("checkout/order_and_pay_5_books", |b| {
        b.iter(|| {
            rt.block_on(async {
                let user = Principal::customer(UserId::new());
                for book in &bench.books {
                    bench.carts.add_item(&user, *book, 2).await.unwrap();
                }
                let order = bench
                    .orders
                    .create_order(&user, "1 Bench Way", "India")
                    .await
                    .unwrap();
                bench
                    .payments
                    .start_or_retry_payment(&user, order.id, PaymentMethod::Upi, None)
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_add_item, bench_order_and_pay);
criterion_main!(benches);
