//! Static error catalog of the resource controller.

use jsonapi_errors::ErrDef;

pub struct ErrorCode;

impl ErrorCode {
    pub const UNAUTHORIZED: ErrDef = ErrDef {
        status: 401,
        title: "Unauthorized",
        code: "resource_controller.unauthorized",
    };

    pub const FORBIDDEN: ErrDef = ErrDef {
        status: 403,
        title: "Forbidden",
        code: "resource_controller.forbidden",
    };

    pub const NOT_FOUND: ErrDef = ErrDef {
        status: 404,
        title: "Not Found",
        code: "resource_controller.not_found",
    };

    pub const CONFLICT: ErrDef = ErrDef {
        status: 409,
        title: "Conflict",
        code: "resource_controller.conflict",
    };

    pub const INVALID_RELATION: ErrDef = ErrDef {
        status: 422,
        title: "Invalid Relation",
        code: "resource_controller.invalid_relation",
    };

    pub const INVALID_TRANSITION: ErrDef = ErrDef {
        status: 422,
        title: "Invalid Transition",
        code: "resource_controller.invalid_transition",
    };

    pub const MALFORMED_PAYLOAD: ErrDef = ErrDef {
        status: 422,
        title: "Malformed Payload",
        code: "resource_controller.malformed_payload",
    };

    pub const MALFORMED_QUERY: ErrDef = ErrDef {
        status: 422,
        title: "Malformed Query Parameter",
        code: "resource_controller.malformed_query",
    };

    pub const INTERNAL: ErrDef = ErrDef {
        status: 500,
        title: "Internal Server Error",
        code: "resource_controller.internal",
    };
}
