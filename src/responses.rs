//! XML bodies for the query-protocol responses.
//!
//! Every document is `<{Action}Response xmlns=...>` holding the action's
//! result element followed by `ResponseMetadata` with a fresh request id.

use crate::state::{Subscription, Topic};
use quick_xml::Writer;
use quick_xml::events::BytesText;
use std::io::{self, Cursor};
use uuid::Uuid;

pub const XMLNS: &str = "http://sns.amazonaws.com/doc/2010-03-31/";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSuccess {
    pub id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub id: String,
    pub code: String,
    pub sender_fault: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub successful: Vec<BatchSuccess>,
    pub failed: Vec<BatchFailure>,
}

fn text(writer: &mut XmlWriter, name: &str, value: &str) -> io::Result<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(value))?;
    Ok(())
}

fn response_metadata(writer: &mut XmlWriter) -> io::Result<()> {
    writer
        .create_element("ResponseMetadata")
        .write_inner_content(|writer| text(writer, "RequestId", &Uuid::new_v4().to_string()))?;
    Ok(())
}

fn document<F>(root: &str, content: F) -> io::Result<Vec<u8>>
where
    F: FnOnce(&mut XmlWriter) -> io::Result<()>,
{
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .create_element(root)
        .with_attribute(("xmlns", XMLNS))
        .write_inner_content(|writer| {
            content(writer)?;
            response_metadata(writer)
        })?;
    Ok(writer.into_inner().into_inner())
}

pub fn create_topic(topic_arn: &str) -> io::Result<Vec<u8>> {
    document("CreateTopicResponse", |writer| {
        writer
            .create_element("CreateTopicResult")
            .write_inner_content(|writer| text(writer, "TopicArn", topic_arn))?;
        Ok(())
    })
}

pub fn list_topics(topics: &[Topic]) -> io::Result<Vec<u8>> {
    document("ListTopicsResponse", |writer| {
        writer
            .create_element("ListTopicsResult")
            .write_inner_content(|writer| {
                writer.create_element("Topics").write_inner_content(|writer| {
                    for topic in topics {
                        writer
                            .create_element("member")
                            .write_inner_content(|writer| text(writer, "TopicArn", &topic.arn))?;
                    }
                    Ok(())
                })?;
                Ok(())
            })?;
        Ok(())
    })
}

pub fn subscribe(subscription_arn: &str) -> io::Result<Vec<u8>> {
    document("SubscribeResponse", |writer| {
        writer
            .create_element("SubscribeResult")
            .write_inner_content(|writer| text(writer, "SubscriptionArn", subscription_arn))?;
        Ok(())
    })
}

pub fn unsubscribe() -> io::Result<Vec<u8>> {
    document("UnsubscribeResponse", |_| Ok(()))
}

/// The public view of a subscription; attributes are not listed.
pub fn list_subscriptions(subscriptions: &[Subscription]) -> io::Result<Vec<u8>> {
    document("ListSubscriptionsResponse", |writer| {
        writer
            .create_element("ListSubscriptionsResult")
            .write_inner_content(|writer| {
                writer
                    .create_element("Subscriptions")
                    .write_inner_content(|writer| {
                        for sub in subscriptions {
                            writer.create_element("member").write_inner_content(|writer| {
                                text(writer, "Endpoint", &sub.endpoint)?;
                                text(writer, "TopicArn", &sub.topic_arn)?;
                                text(writer, "Owner", &sub.owner)?;
                                text(writer, "Protocol", &sub.protocol)?;
                                text(writer, "SubscriptionArn", &sub.subscription_arn)
                            })?;
                        }
                        Ok(())
                    })?;
                Ok(())
            })?;
        Ok(())
    })
}

pub fn publish(message_id: &str) -> io::Result<Vec<u8>> {
    document("PublishResponse", |writer| {
        writer
            .create_element("PublishResult")
            .write_inner_content(|writer| text(writer, "MessageId", message_id))?;
        Ok(())
    })
}

pub fn publish_batch(result: &BatchResult) -> io::Result<Vec<u8>> {
    document("PublishBatchResponse", |writer| {
        writer
            .create_element("PublishBatchResult")
            .write_inner_content(|writer| {
                writer.create_element("Successful").write_inner_content(|writer| {
                    for entry in &result.successful {
                        writer.create_element("member").write_inner_content(|writer| {
                            text(writer, "Id", &entry.id)?;
                            text(writer, "MessageId", &entry.message_id)
                        })?;
                    }
                    Ok(())
                })?;
                writer.create_element("Failed").write_inner_content(|writer| {
                    for entry in &result.failed {
                        writer.create_element("member").write_inner_content(|writer| {
                            text(writer, "Id", &entry.id)?;
                            text(writer, "Code", &entry.code)?;
                            text(writer, "SenderFault", &entry.sender_fault.to_string())?;
                            text(writer, "Message", &entry.message)
                        })?;
                    }
                    Ok(())
                })?;
                Ok(())
            })?;
        Ok(())
    })
}

pub fn not_implemented() -> io::Result<Vec<u8>> {
    document("NotImplementedResponse", |_| Ok(()))
}

pub fn error(fault: &str, code: &str, message: &str) -> io::Result<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .create_element("ErrorResponse")
        .with_attribute(("xmlns", XMLNS))
        .write_inner_content(|writer| {
            writer.create_element("Error").write_inner_content(|writer| {
                text(writer, "Type", fault)?;
                text(writer, "Code", code)?;
                text(writer, "Message", message)
            })?;
            text(writer, "RequestId", &Uuid::new_v4().to_string())
        })?;
    Ok(writer.into_inner().into_inner())
}
