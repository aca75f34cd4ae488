use serde_json::json;

use crate::api::{GraphqlApi, InboxApi};
use crate::error::ApiError;
use crate::models::{Message, MessageDraft, PageRequest};

const MESSAGE_FIELDS: &str = r"
    _id
    conversationId
    userId
    customerId
    content
    attachments { url name type size }
    mentionedUserIds
    replyToId
    internal
    status
    createdAt
";

fn add_message_mutation() -> String {
    format!(
        r"mutation conversationMessageAdd(
            $conversationId: String!
            $content: String!
            $mentionedUserIds: [String]
            $replyToId: String
            $internal: Boolean
            $attachments: [AttachmentInput]
        ) {{
            conversationMessageAdd(
                conversationId: $conversationId
                content: $content
                mentionedUserIds: $mentionedUserIds
                replyToId: $replyToId
                internal: $internal
                attachments: $attachments
            ) {{ {MESSAGE_FIELDS} }}
        }}"
    )
}

fn messages_query() -> String {
    format!(
        r"query conversationMessages($conversationId: String!, $skip: Int, $limit: Int) {{
            conversationMessages(conversationId: $conversationId, skip: $skip, limit: $limit) {{ {MESSAGE_FIELDS} }}
        }}"
    )
}

const MARK_AS_READ_MUTATION: &str = r"
    mutation conversationMarkAsRead($_id: String!) {
        conversationMarkAsRead(_id: $_id) { _id }
    }
";

impl InboxApi for GraphqlApi {
    async fn send_message(&self, draft: &MessageDraft) -> Result<Message, ApiError> {
        let variables = json!({
            "conversationId": draft.conversation_id,
            "content": draft.content,
            "mentionedUserIds": draft.mentioned_user_ids,
            "replyToId": draft.reply_to_id,
            "internal": draft.internal,
            "attachments": draft.attachments,
        });
        self.execute(&add_message_mutation(), variables, "conversationMessageAdd")
            .await
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        page: PageRequest,
    ) -> Result<Vec<Message>, ApiError> {
        let variables = json!({
            "conversationId": conversation_id,
            "skip": page.skip,
            "limit": page.limit,
        });
        self.execute(&messages_query(), variables, "conversationMessages")
            .await
    }

    async fn mark_as_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .execute(
                MARK_AS_READ_MUTATION,
                json!({ "_id": conversation_id }),
                "conversationMarkAsRead",
            )
            .await?;
        Ok(())
    }
}
