//! Notification texts for each rescue workflow event.
//!
//! Everything here is pure: the same event always yields the same payload.

use std::collections::BTreeMap;

use crate::types::RescueStatus;

pub const RESCUE_CREATED_TITLE: &str = "Yêu cầu cứu hộ mới";
pub const GARAGE_REJECTED_TITLE: &str = "Yêu cầu của quý khách đã bị từ chối";
pub const CUSTOMER_CANCELLED_TITLE: &str = "Khách hàng đã từ chối yêu cầu";
pub const STATUS_CHANGED_TITLE: &str = "Tình trạng cứu hộ";

pub const TYPE_RESCUE: &str = "rescue";
pub const TYPE_GARAGE_REJECT: &str = "garage-reject-request";
pub const TYPE_CUSTOMER_CANCEL: &str = "customer-cancel-request";

/// Title, body and data payload of one push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl Notification {
    fn new(title: &str, body: impl Into<String>, key: &str, value: impl Into<String>) -> Self {
        let mut data = BTreeMap::new();
        data.insert(key.to_string(), value.into());
        Self {
            title: title.to_string(),
            body: body.into(),
            data,
        }
    }
}

pub fn rescue_created(description: &str) -> Notification {
    Notification::new(RESCUE_CREATED_TITLE, description, "type", TYPE_RESCUE)
}

pub fn garage_rejected(reason: &str) -> Notification {
    Notification::new(GARAGE_REJECTED_TITLE, reason, "type", TYPE_GARAGE_REJECT)
}

pub fn customer_cancelled(reason: &str) -> Notification {
    Notification::new(CUSTOMER_CANCELLED_TITLE, reason, "type", TYPE_CUSTOMER_CANCEL)
}

/// Unknown codes get an empty body but are still relayed.
pub fn status_changed(code: i64) -> Notification {
    let body = RescueStatus::from_code(code)
        .map(status_text)
        .unwrap_or_default();
    Notification::new(STATUS_CHANGED_TITLE, body, "status", code.to_string())
}

pub fn status_text(status: RescueStatus) -> &'static str {
    match status {
        RescueStatus::Pending => "Đang chờ",
        RescueStatus::Accepted => "Garage đã chấp nhận yêu cầu của bạn",
        RescueStatus::Arriving => "Nhân viên cứu hộ đang đến",
        RescueStatus::Arrived => "Cứu hộ đã đến nơi",
        RescueStatus::Working => "Đang tiến hành sửa chữa",
        RescueStatus::Rejected => "Garage đã từ chối yêu cầu của bạn",
        RescueStatus::Done => "Đã hoàn thành sửa chữa",
    }
}
