//! Checkout and the order lifecycle.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{Caller, send_best_effort, validate_request};
use crate::domain::{
    AddressRepository, AppError, CartRepository, CheckoutRequest, EmailMessage, EmailSender,
    Order, OrderListQuery, OrderRepository, OrderStatus, PaginatedResponse,
    UpdateOrderStatusRequest, UserRepository,
};
use crate::infra::observability::record_order_placed;

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartRepository>,
    addresses: Arc<dyn AddressRepository>,
    users: Arc<dyn UserRepository>,
    email: Arc<dyn EmailSender>,
}

impl OrderService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartRepository>,
        addresses: Arc<dyn AddressRepository>,
        users: Arc<dyn UserRepository>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            orders,
            carts,
            addresses,
            users,
            email,
        }
    }

    /// Turns the cart into a pending order.
    ///
    /// Stock is reserved and the cart cleared in the same transaction that
    /// writes the order, so a failed reservation leaves everything as it was.
    #[instrument(skip(self, request))]
    pub async fn checkout(&self, user_id: Uuid, request: &CheckoutRequest) -> Result<Order, AppError> {
        validate_request(request)?;

        let lines = self.carts.cart_lines(user_id).await?;
        if lines.is_empty() {
            return Err(AppError::invalid("cart", "Cart is empty"));
        }
        let address = self
            .addresses
            .get_address(user_id, request.shipping_address_id)
            .await?
            .ok_or_else(|| AppError::not_found("address"))?;

        if let Some(line) = lines.iter().find(|l| !l.is_active) {
            return Err(AppError::conflict(format!(
                "'{}' is no longer available",
                line.name
            )));
        }
        if let Some(line) = lines.iter().find(|l| !l.is_purchasable()) {
            return Err(AppError::conflict(format!(
                "Insufficient stock for '{}'",
                line.name
            )));
        }

        let notes = request
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let order = Order::from_cart(user_id, &lines, &address, notes);
        self.orders.place_order(&order).await?;

        record_order_placed();
        info!(
            order_id = %order.id,
            total_cents = order.total_cents,
            items = order.items.len(),
            "Order placed"
        );

        if let Some(user) = self.users.get_user(user_id).await? {
            send_best_effort(
                self.email.as_ref(),
                EmailMessage::new(
                    &user.email,
                    "Order confirmation",
                    format!(
                        "Thanks for your order {}. Total: {} {}.",
                        order.id,
                        format_cents(order.total_cents),
                        order.currency.to_uppercase()
                    ),
                ),
            )
            .await;
        }
        Ok(order)
    }

    #[instrument(skip(self, query))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        query: &OrderListQuery,
    ) -> Result<PaginatedResponse<Order>, AppError> {
        let page = query.pagination();
        let (orders, total) = self
            .orders
            .list_orders(Some(user_id), query.status, &page)
            .await?;
        Ok(PaginatedResponse::new(orders, total, &page))
    }

    /// Orders of other customers are reported as missing.
    #[instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn get(&self, caller: Caller, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get_order(id)
            .await?
            .filter(|order| caller.can_access(order.user_id))
            .ok_or_else(|| AppError::not_found(format!("order {id}")))
    }

    /// Customers may cancel their own orders until they are paid.
    #[instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn cancel(&self, caller: Caller, id: Uuid) -> Result<Order, AppError> {
        let order = self
            .orders
            .get_order(id)
            .await?
            .filter(|order| order.user_id == caller.id)
            .ok_or_else(|| AppError::not_found(format!("order {id}")))?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::conflict(format!(
                "Cannot cancel an order that is {}",
                order.status
            )));
        }

        let cancelled = self
            .orders
            .transition_order(id, &[OrderStatus::Pending], OrderStatus::Cancelled, None, true)
            .await?
            .ok_or_else(|| AppError::conflict("Order changed while cancelling"))?;
        info!(order_id = %id, "Order cancelled by customer");
        Ok(cancelled)
    }

    #[instrument(skip(self, query))]
    pub async fn admin_list(
        &self,
        query: &OrderListQuery,
    ) -> Result<PaginatedResponse<Order>, AppError> {
        let page = query.pagination();
        let (orders, total) = self.orders.list_orders(None, query.status, &page).await?;
        Ok(PaginatedResponse::new(orders, total, &page))
    }

    /// Moves an order along its lifecycle.
    ///
    /// Shipping needs a tracking number. Cancelling restores stock, and a
    /// cancelled paid order leaves its payment waiting for a refund.
    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn admin_update_status(
        &self,
        id: Uuid,
        request: &UpdateOrderStatusRequest,
    ) -> Result<Order, AppError> {
        validate_request(request)?;

        let order = self
            .orders
            .get_order(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {id}")))?;
        let next = request.status;
        if !order.status.can_transition_to(next) {
            return Err(AppError::conflict(format!(
                "Cannot move an order from {} to {next}",
                order.status
            )));
        }
        let tracking = request
            .tracking_number
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if next == OrderStatus::Shipped && tracking.is_none() {
            return Err(AppError::invalid(
                "tracking_number",
                "a tracking number is required to ship an order",
            ));
        }

        let restore_stock = next == OrderStatus::Cancelled;
        let updated = self
            .orders
            .transition_order(id, &[order.status], next, tracking, restore_stock)
            .await?
            .ok_or_else(|| AppError::conflict("Order status changed concurrently"))?;

        if next == OrderStatus::Cancelled && order.status == OrderStatus::Paid {
            warn!(order_id = %id, "Paid order cancelled, refund pending");
        }

        info!(order_id = %id, from = %order.status, to = %next, "Order status updated");

        if next == OrderStatus::Shipped {
            if let Some(user) = self.users.get_user(updated.user_id).await? {
                send_best_effort(
                    self.email.as_ref(),
                    EmailMessage::new(
                        &user.email,
                        "Your order has shipped",
                        format!(
                            "Order {} is on its way. Tracking number: {}.",
                            updated.id,
                            updated.tracking_number.as_deref().unwrap_or("-")
                        ),
                    ),
                )
                .await;
            }
        }
        Ok(updated)
    }
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
