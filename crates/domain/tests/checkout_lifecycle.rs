//! Integration tests walking the domain types through a checkout.

use domain::{
    BookId, Cart, CartItem, CartStatus, DomainError, Money, Order, OrderTotals, Payment,
    PaymentMethod, PaymentStatus, TaxRate, Transaction, TransactionStatus, UserId,
};

fn two_line_cart() -> (Cart, Vec<CartItem>) {
    let mut cart = Cart::new_active(UserId::new());
    let items = vec![
        CartItem::new(cart.id, BookId::new(), 2, Money::from_units(10)).unwrap(),
        CartItem::new(cart.id, BookId::new(), 1, Money::from_units(5)).unwrap(),
    ];
    cart.recompute(&items).unwrap();
    (cart, items)
}

fn placed_order() -> (Cart, Order) {
    let (mut cart, _) = two_line_cart();
    let totals = OrderTotals::compute(cart.total_cost, Money::from_units(20), TaxRate::DEFAULT)
        .unwrap();
    let order = Order::place(cart.user_id, cart.id, totals, "42 MG Road", "India");
    cart.mark_ordered().unwrap();
    (cart, order)
}

#[test]
fn test_cart_totals_follow_items() {
    let (mut cart, mut items) = two_line_cart();
    assert_eq!(cart.total_books, 3);
    assert_eq!(cart.total_cost, Money::from_cents(2_500));

    items[1].add(2).unwrap();
    assert!(items[0].decrement());
    cart.recompute(&items).unwrap();
    assert_eq!(cart.total_books, 4);
    assert_eq!(cart.total_cost, Money::from_cents(2_500));
}

#[test]
fn test_order_freezes_totals() {
    let (cart, order) = placed_order();

    assert_eq!(cart.status, CartStatus::Ordered);
    assert_eq!(order.cart_id, Some(cart.id));
    assert_eq!(order.cart_cost, Money::from_cents(2_500));
    assert_eq!(order.shipping_cost, Money::from_cents(2_000));
    assert_eq!(order.taxes, Money::from_cents(810));
    assert_eq!(order.total, Money::from_cents(5_310));
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[test]
fn test_three_failures_exhaust_payment() {
    let (_, mut order) = placed_order();
    let mut payment = Payment::open(&order, PaymentMethod::Upi);
    assert_eq!(payment.total_cost, order.total);

    let mut log = Vec::new();
    for _ in 0..3 {
        let status = payment.record_attempt(TransactionStatus::Failure).unwrap();
        order.mirror_payment(status);
        log.push(Transaction::record(payment.id, TransactionStatus::Failure));
    }

    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert!(order.is_settled());
    assert!(!payment.can_attempt());
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|t| t.message == "Payment Failed"));

    let err = payment
        .record_attempt(TransactionStatus::Success)
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    assert_eq!(payment.attempts, 3);
}

#[test]
fn test_retry_after_failure_can_succeed() {
    let (_, mut order) = placed_order();
    let mut payment = Payment::open(&order, PaymentMethod::Card);

    payment.record_attempt(TransactionStatus::Failure).unwrap();
    assert_eq!(payment.remaining_attempts(), 2);
    assert!(payment.change_method(PaymentMethod::Netbanking).unwrap());

    let status = payment.record_attempt(TransactionStatus::Success).unwrap();
    order.mirror_payment(status);

    assert_eq!(order.payment_status, PaymentStatus::Successful);
    assert_eq!(payment.mode_of_payment, PaymentMethod::Netbanking);
    assert!(payment.change_method(PaymentMethod::Cod).is_err());
}

#[test]
fn test_cancelling_cart_twice_is_noop() {
    let (mut cart, _) = placed_order();
    assert!(cart.mark_cancelled());
    assert!(!cart.mark_cancelled());
    assert_eq!(cart.status, CartStatus::Cancelled);
}
